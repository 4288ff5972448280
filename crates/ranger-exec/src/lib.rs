mod error;
pub use error::{ExecError, ExecResult};

mod util;

pub mod chrome;
pub use chrome::CacheProvisioner;
pub mod git;
pub use git::GitResolver;
pub mod group;
pub use group::ProcessGroups;
pub mod setup;
pub use setup::ShellSetupRunner;
pub mod shell;
pub use shell::ShellExecutor;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{CacheProvisioner, GitResolver, ProcessGroups, ShellExecutor, ShellSetupRunner};
}
