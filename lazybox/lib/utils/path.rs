//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The sub directory of the user's home where lazybox stores its data.
pub const LAZYBOX_HOME_DIR: &str = ".lazybox";

/// The environment variable that overrides the lazybox home directory.
pub const LAZYBOX_HOME_ENV_VAR: &str = "LAZYBOX_HOME";

/// The environment variable that points at the configuration file.
pub const LAZYBOX_CONFIG_ENV_VAR: &str = "LAZYBOX_CONFIG";

/// The configuration filename inside the lazybox home directory.
pub const LAZYBOX_CONFIG_FILENAME: &str = "lazybox.toml";

/// The SQLite database filename inside the lazybox home directory.
pub const LAZYBOX_DB_FILENAME: &str = "lazybox.db";
