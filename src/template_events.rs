//! Template lifecycle events and hooks (ambient addition, §3/§4.2).
//!
//! An `Arc<dyn Fn>` hook container an embedder can register against to observe
//! template learning, collisions, evictions, expirations, and missing-
//! template data arrivals in real time, without polling.

use std::sync::Arc;

/// Which protocol a template event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TemplateProtocol {
    V9,
    Ipfix,
}

/// Template lifecycle events emitted during registry operations.
#[derive(Debug, Clone)]
pub enum TemplateEvent {
    /// A new template was learned and added to the cache.
    Learned {
        template_id: u16,
        protocol: TemplateProtocol,
    },
    /// A template id already in the cache was redefined with a different
    /// shape — either a genuine collision between exporters sharing an
    /// ExporterKey, or an exporter restart (§4.7).
    Collision {
        template_id: u16,
        protocol: TemplateProtocol,
    },
    /// A template was evicted from the cache due to the LRU bound.
    Evicted {
        template_id: u16,
        protocol: TemplateProtocol,
    },
    /// A template expired due to an opt-in TTL bound.
    Expired {
        template_id: u16,
        protocol: TemplateProtocol,
    },
    /// A data set arrived referencing a template not yet in the cache; the
    /// datagram has been deferred (§4.5).
    MissingTemplate {
        template_id: u16,
        protocol: TemplateProtocol,
    },
}

pub type TemplateHook = Arc<dyn Fn(&TemplateEvent) + Send + Sync + 'static>;

#[derive(Clone, Default)]
pub struct TemplateHooks {
    hooks: Vec<TemplateHook>,
}

impl std::fmt::Debug for TemplateHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateHooks")
            .field("hook_count", &self.hooks.len())
            .finish()
    }
}

impl TemplateHooks {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn register<F>(&mut self, hook: F)
    where
        F: Fn(&TemplateEvent) + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
    }

    pub fn trigger(&self, event: &TemplateEvent) {
        for hook in &self.hooks {
            hook(event);
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
