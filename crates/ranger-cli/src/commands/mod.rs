mod cache;
mod clean;
mod init;
mod list_chrome;
mod run;
mod status;

pub use cache::cache_clean;
pub use clean::clean;
pub use init::init;
pub use list_chrome::list_chrome;
pub use run::run;
pub use status::status;
