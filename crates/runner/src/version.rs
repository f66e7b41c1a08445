/// `git describe` of the build, or the crate version outside a checkout.
pub const GIT_VERSION: &str = env!("GIT_VERSION");

pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build date (UTC)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

pub const BUILD_TARGET: &str = env!("BUILD_TARGET");

/// Version string for --version
pub const VERSION: &str =
    concat!(env!("GIT_VERSION"), " (", env!("GIT_HASH"), ")");

/// Banner logged once at startup.
pub fn startup_banner() -> String {
    format!(
        r#"
                  _ _ _   _
   __ _ _ __   __ _| (_) |_(_) ___ __ _
  / _` | '_ \ / _` | | | __| |/ __/ _` |
 | (_| | | | | (_| | | | |_| | (_| (_| |
  \__,_|_| |_|\__,_|_|_|\__|_|\___\__,_|

  table snapshots -> object store -> catalog crawler

  Version:  {GIT_VERSION}
  Commit:   {GIT_HASH}
  Built:    {BUILD_DATE}
  Target:   {BUILD_TARGET}
"#
    )
}
