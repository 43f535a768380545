mod commit;
mod init;
mod mark;
mod revisions;
mod show;
mod status;
mod systems;

pub use commit::cmd_commit;
pub use init::cmd_init;
pub use mark::cmd_mark;
pub use revisions::cmd_revisions;
pub use show::cmd_show;
pub use status::cmd_status;
pub use systems::cmd_systems;
