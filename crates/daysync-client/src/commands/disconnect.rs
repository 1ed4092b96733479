//! Forgetting the stored token.

use daysync_google::GoogleAuth;

use crate::error::ClientResult;

pub fn run(auth: &GoogleAuth) -> ClientResult<()> {
    let was_connected = auth.is_connected();
    auth.disconnect();
    if was_connected {
        println!("Disconnected from Google Calendar.");
    } else {
        println!("No Google account was connected.");
    }
    Ok(())
}
