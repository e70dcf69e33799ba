//! Profiling utilities based on the `puffin` crate.
//!
//! Scopes are compiled in unconditionally and cost almost nothing until
//! [`enable`] turns them on. The build task marks each phase with
//! `profile_scope!` so long packaging runs can be inspected in `puffin_viewer`.

pub use puffin::{profile_function, profile_scope};

/// Turn scope recording on or off.
pub fn enable(on: bool) {
    puffin::set_scopes_on(on);
}

/// Mark the end of one profiled unit of work (one build, one runtime tick).
#[inline]
pub fn new_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(feature = "profiling-server")]
static PROFILING_SERVER: std::sync::OnceLock<puffin_http::Server> = std::sync::OnceLock::new();

/// Start a puffin HTTP server on the default port and enable scopes.
///
/// # Example
/// ```no_run
/// bale_core::profiling::init_server();
/// ```
#[cfg(feature = "profiling-server")]
pub fn init_server() {
    enable(true);

    match puffin_http::Server::new("0.0.0.0:8585") {
        Ok(server) => {
            tracing::info!("Puffin profiler server started on http://0.0.0.0:8585");
            let _ = PROFILING_SERVER.set(server);
        }
        Err(e) => {
            tracing::error!("Failed to start puffin server: {}", e);
        }
    }
}
