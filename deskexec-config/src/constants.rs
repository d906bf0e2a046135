/// Command defaults shared by the validator and the launcher.
pub mod commands {
    /// Base commands the service accepts out of the box.
    pub const DEFAULT_ALLOW_LIST: &[&str] = &[
        // Listing, path printing and file reading
        "ls",
        "pwd",
        "cat",
        "head",
        "tail",
        "wc",
        "echo",
        "whoami",
        "date",
        "tree",
        "which",
        // JavaScript
        "node",
        "npm",
        "npx",
        "yarn",
        "pnpm",
        "bun",
        // Python
        "python",
        "python3",
        "pip",
        "pip3",
        // Go
        "go",
        // Rust
        "cargo",
        "rustc",
        "rustup",
        // Version control
        "git",
    ];

    /// Characters that would let a caller chain, pipe or redirect commands.
    pub const FORBIDDEN_CHARACTERS: &[char] = &[';', '&', '|', '>', '<'];

    /// Conventional install locations prepended to `PATH` so command
    /// resolution does not depend on how the service was started.
    pub const DEFAULT_EXTRA_PATH_ENTRIES: &[&str] = &[
        "/usr/local/bin",
        "/usr/bin",
        "/bin",
        "/usr/local/sbin",
        "/opt/homebrew/bin",
        "/usr/local/go/bin",
        "~/.cargo/bin",
        "~/.local/bin",
        "~/go/bin",
        "~/.bun/bin",
    ];
}

/// Timeout defaults.
pub mod timeouts {
    pub const DEFAULT_EXECUTION_TIMEOUT_SECONDS: u64 = 60;
    pub const DEFAULT_KILL_GRACE_MS: u64 = 2_000;
    pub const MIN_KILL_GRACE_MS: u64 = 10;
}

/// HTTP server defaults.
pub mod server {
    pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3030";
    pub const DEFAULT_OUTPUT_BUFFER_CHUNKS: usize = 256;
    pub const EXECUTION_ID_HEADER: &str = "x-execution-id";
}

/// Config file discovery.
pub mod loader {
    pub const CONFIG_FILE_NAME: &str = "deskexec.toml";
    pub const CONFIG_PATH_ENV: &str = "DESKEXEC_CONFIG_PATH";
    pub const PROJECT_ROOT_ENV: &str = "DESKEXEC_PROJECT_ROOT";
}

/// Logging defaults.
pub mod debug {
    pub const DEFAULT_TRACE_LEVEL: &str = "info";
    pub const DEFAULT_TRACE_TARGETS: &[&str] = &["deskexec", "deskexec_runner", "deskexec_config"];
    pub const DEFAULT_CONSOLE_LOG_FILE: &str = "deskexec-console.log";
}
