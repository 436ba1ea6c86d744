//! Scene view extensions: how plugins hook the host's rendering, and the registry that holds them.

use std::sync::Arc;

use crate::post_process::{PassCallbackList, PostProcessingPass};

/// A plugin hook into the host's per-view rendering.
pub trait SceneViewExtension: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_active_this_frame(&self) -> bool {
        true
    }

    /// Called for every post-process slot, every frame. Push onto `callbacks` to run after `pass`.
    fn subscribe_to_post_processing_pass(
        &self,
        pass: PostProcessingPass,
        callbacks: &mut PassCallbackList,
        is_pass_enabled: bool,
    );
}

/// Registered extensions, queried in registration order.
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn SceneViewExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Arc<dyn SceneViewExtension>) {
        log::info!("scene view extension '{}' registered", extension.name());
        self.extensions.push(extension);
    }

    /// Remove every extension with this name. Returns how many were removed.
    pub fn unregister(&mut self, name: &str) -> usize {
        let before = self.extensions.len();
        self.extensions.retain(|e| e.name() != name);
        before - self.extensions.len()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SceneViewExtension>> {
        self.extensions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post_process::PostProcessSequence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl SceneViewExtension for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn subscribe_to_post_processing_pass(&self, _: PostProcessingPass, _: &mut PassCallbackList, _: bool) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn every_slot_is_offered_to_every_extension() {
        let ext = Arc::new(Counting { name: "count", calls: AtomicUsize::new(0) });
        let mut registry = ExtensionRegistry::new();
        registry.register(ext.clone());
        PostProcessSequence::default().gather(&registry);
        assert_eq!(ext.calls.load(Ordering::SeqCst), PostProcessingPass::ALL.len());
    }

    #[test]
    fn unregister_removes_by_name() {
        let mut registry = ExtensionRegistry::new();
        registry.register(Arc::new(Counting { name: "a", calls: AtomicUsize::new(0) }));
        registry.register(Arc::new(Counting { name: "b", calls: AtomicUsize::new(0) }));
        assert_eq!(registry.unregister("a"), 1);
        assert_eq!(registry.len(), 1);
    }
}
