// ============================
// crates/backend-bin/src/browser.rs
// ============================
//! Opens the lobby page in the desktop browser.

use std::io;

fn launch_with<F>(url: &str, launcher: F) -> bool
where
    F: FnOnce(&str) -> io::Result<()>,
{
    match launcher(url) {
        Ok(()) => {
            tracing::debug!(url, "opened browser");
            true
        },
        Err(err) => {
            tracing::warn!(url, error = %err, "unable to open browser");
            false
        },
    }
}

/// Fire and forget; failure only logs
pub fn open_browser(url: &str) -> bool {
    launch_with(url, |url| open::that_detached(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_receives_url() {
        let mut seen = None;
        let opened = launch_with("http://127.0.0.1:8787", |url| {
            seen = Some(url.to_string());
            Ok(())
        });
        assert!(opened);
        assert_eq!(seen.as_deref(), Some("http://127.0.0.1:8787"));
    }

    #[test]
    fn test_launch_failure_is_reported_not_raised() {
        let opened = launch_with("http://127.0.0.1:8787", |_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "no browser"))
        });
        assert!(!opened);
    }
}
