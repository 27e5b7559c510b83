//! Cancel command implementation.

use anyhow::Result;

use rshare_core::code::ShareCode;

use super::CancelArgs;
use crate::client::ApiClient;

/// Run the cancel command.
pub async fn run(args: CancelArgs) -> Result<()> {
    let global_config = super::load_config();
    let code = ShareCode::parse(&args.code, global_config.session.code_length)?;
    let client = ApiClient::new(&args.server.server)?;

    client.cancel(code.as_str()).await?;
    println!("  Share {} cancelled.", code);
    Ok(())
}
