//! Browser bindings used when compiled for `wasm32` with the `wasm-web` feature.
//!
//! Every helper degrades to `None` when no `window` is reachable (workers, non-browser hosts).

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
mod wasm {
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;
    use web_sys::{Document, VisibilityState};

    pub fn user_agent() -> Option<String> {
        web_sys::window()?.navigator().user_agent().ok()
    }

    pub fn viewport() -> Option<(u32, u32)> {
        let window = web_sys::window()?;
        let width = window.inner_width().ok()?.as_f64()?;
        let height = window.inner_height().ok()?.as_f64()?;
        Some((width.max(0.0) as u32, height.max(0.0) as u32))
    }

    pub fn page_path() -> Option<String> {
        web_sys::window()?.location().pathname().ok()
    }

    /// Keeps a `visibilitychange` listener registered until dropped.
    pub struct VisibilityListener {
        document: Document,
        closure: Closure<dyn FnMut(web_sys::Event)>,
    }

    impl Drop for VisibilityListener {
        fn drop(&mut self) {
            let _ = self.document.remove_event_listener_with_callback(
                "visibilitychange",
                self.closure.as_ref().unchecked_ref(),
            );
        }
    }

    /// Invokes `callback` each time the page transitions back to the visible state.
    pub fn on_visible<F>(callback: F) -> Option<VisibilityListener>
    where
        F: Fn() + 'static,
    {
        let document = web_sys::window()?.document()?;
        let observed = document.clone();
        let closure = Closure::wrap(Box::new(move |_event: web_sys::Event| {
            if observed.visibility_state() == VisibilityState::Visible {
                callback();
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        document
            .add_event_listener_with_callback("visibilitychange", closure.as_ref().unchecked_ref())
            .ok()?;
        Some(VisibilityListener { document, closure })
    }
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use wasm::{on_visible, page_path, user_agent, viewport, VisibilityListener};

#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
pub fn user_agent() -> Option<String> {
    None
}

#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
pub fn viewport() -> Option<(u32, u32)> {
    None
}

#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
pub fn page_path() -> Option<String> {
    None
}
