// src/constants.rs

/// DD name of the dataset forwarded to the child's standard input.
pub const DD_STDIN: &str = "STDIN";

/// DD name of the dataset receiving the child's standard output.
pub const DD_STDOUT: &str = "STDOUT";

/// DD name of the dataset receiving the child's standard error.
pub const DD_STDERR: &str = "STDERR";

/// DD name of the optional environment override dataset.
pub const DD_STDENV: &str = "STDENV";

/// DD name of the shared fallback output (the job log).
pub const DD_SYSOUT: &str = "SYSOUT";

/// Prefix of the environment variables that allocate a DD name to a path.
pub const DD_ENV_PREFIX: &str = "DD_";

/// Environment variable naming the configuration file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "RKTBATCH_CONFIG";

/// Size of the single in-flight buffer used per relay channel.
pub const RELAY_BUFFER_SIZE: usize = 4096;

/// Process exit code for any unrecoverable setup or relay failure.
pub const SETUP_FAILURE_EXIT_CODE: i32 = 12;

/// Marker that starts a comment line in the STDENV dataset.
pub const STDENV_COMMENT_MARKER: char = '#';

/// Key of the address-space sharing policy toggle.
pub const SHAREAS_KEY: &str = "_BPX_SHAREAS";

/// Entry appended when STDENV does not set the sharing policy itself.
pub const SHAREAS_DEFAULT_ENTRY: &str = "_BPX_SHAREAS=MUST";

/// Static defaults every child environment starts from.
pub const DEFAULT_ENVIRONMENT: &[&str] = &[
    "LIBPATH=/lib:/usr/lib",
    "PATH=/bin:/usr/bin",
    "_BPXK_AUTOCVT=ON",
    "_BPXK_JOBLOG=STDERR",
    "_BPX_SPAWN_SCRIPT=YES",
    "_EDC_ADD_ERRNO2=1",
];
