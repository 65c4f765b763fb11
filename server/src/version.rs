pub const CARDIO_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "cardio-server";

pub fn git_commit_hash() -> &'static str {
    cardio_rpc::git_commit_hash().unwrap_or("unknown")
}
