mod maintenance;
mod serve;

pub use maintenance::{cmd_init, cmd_migrate, cmd_prune_tokens, cmd_verify_account};
pub use serve::cmd_serve;
