//! Printing a usable access token.

use daysync_google::GoogleAuth;

use crate::error::{ClientError, ClientResult};

/// Prints an access token, refreshing the stored one when it expired.
pub async fn run(auth: &GoogleAuth) -> ClientResult<()> {
    let token = auth
        .get_access_token()
        .await
        .ok_or_else(ClientError::not_connected)?;
    println!("{}", token);
    Ok(())
}
