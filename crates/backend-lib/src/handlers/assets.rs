// ============================
// crates/backend-lib/src/handlers/assets.rs
// ============================
//! Static web client.
//!
//! Unknown paths fall back to `index.html` so the client can route on its own. Only GET and
//! HEAD are served; anything else is answered with 405.

use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};

pub const INDEX_FILE: &str = "index.html";

/// File service rooted at `web_root`
pub fn static_files(web_root: &Path) -> ServeDir<ServeFile> {
    ServeDir::new(web_root)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(web_root.join(INDEX_FILE)))
}
