//! SoundLens Auth Service Library
//!
//! This library implements the server side of SoundLens, a music analytics
//! application backed by the Spotify Web API. Its centerpiece is the OAuth
//! access-token lifecycle: acquiring tokens through the authorization-code
//! flow, caching them in server-held sessions, proactively refreshing them
//! before expiry, and failing over to an explicit reconnect flow when a
//! refresh becomes unrecoverable.
//!
//! # Modules
//!
//! - `api` - HTTP route handlers (OAuth flow, session view, data proxies)
//! - `config` - Configuration management and environment variables
//! - `error` - The authentication/API error taxonomy
//! - `management` - Session store, token refresh, mirror and refresh monitor
//! - `server` - HTTP server wiring
//! - `spotify` - Spotify Web API client with retry/backoff
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use soundlens::{config, management::SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> soundlens::Res<()> {
//!     config::load_env().await?;
//!     let store = SessionStore::in_memory();
//!     // Wire up a SessionManager and start the server...
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Provides a standard error handling pattern throughout the application
/// using a boxed dynamic error trait object. This allows for flexible
/// error handling while maintaining Send + Sync bounds for async contexts.
///
/// # Type Parameters
///
/// - `T` - The success type returned on successful operations
///
/// # Example
///
/// ```
/// use soundlens::Res;
///
/// async fn fetch_data() -> Res<String> {
///     Ok("data".to_string())
/// }
/// ```
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// Creates a formatted output line with a distinctive blue "o" indicator
/// followed by the provided message. Used for general information and
/// status updates throughout the application.
///
/// # Example
///
/// ```
/// info!("Starting auth service...");
/// info!("Session created for {}", user);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// Creates a formatted output line with a green "✓" indicator to signify
/// successful completion of operations.
///
/// # Example
///
/// ```
/// success!("Spotify connection established");
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Creates a formatted error output with a red "!" indicator and immediately
/// terminates the program with exit code 1. Used for unrecoverable errors
/// that require immediate program termination, such as missing configuration
/// at startup.
///
/// # Example
///
/// ```
/// error!("Missing required environment variable: {}", var_name);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Creates a formatted output line with a yellow "!" indicator to highlight
/// potential issues or important notices that don't require program
/// termination. Token and cookie values never appear in log lines; log
/// presence and lengths only.
///
/// # Example
///
/// ```
/// warning!("Session file not found, starting with an empty store");
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
