//! Plugin registry: the three phase pipelines of an application.

use std::fmt;

use guarapi_core::GuarapiConfig;
use parking_lot::RwLock;
use tracing::debug;

use crate::app::Guarapi;
use crate::handler::Handler;
use crate::pipeline::Pipeline;

/// The phase a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Runs before the response is produced.
    Pre,
    /// Runs after the response has ended.
    Post,
    /// Runs when a pre or post handler fails.
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pre => "pre",
            Self::Post => "post",
            Self::Error => "error",
        })
    }
}

/// Hooks contributed by a plugin. Every hook is optional.
#[derive(Debug, Default, Clone)]
pub struct PluginHooks {
    /// Plugin name, used in logs.
    pub name: Option<&'static str>,
    /// Appended to the pre phase.
    pub pre: Option<Handler>,
    /// Appended to the post phase.
    pub post: Option<Handler>,
    /// Appended to the error phase.
    pub error: Option<Handler>,
}

impl PluginHooks {
    /// Empty hooks carrying a name.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    /// Set the pre hook.
    #[must_use]
    pub fn with_pre(mut self, handler: Handler) -> Self {
        self.pre = Some(handler);
        self
    }

    /// Set the post hook.
    #[must_use]
    pub fn with_post(mut self, handler: Handler) -> Self {
        self.post = Some(handler);
        self
    }

    /// Set the error hook.
    #[must_use]
    pub fn with_error(mut self, handler: Handler) -> Self {
        self.error = Some(handler);
        self
    }
}

/// A plugin contributes hooks to an application.
///
/// `setup` runs exactly once, when the plugin is registered. It may also
/// install capabilities on the application (see
/// [`Guarapi::provide_middleware`] and [`Guarapi::provide_logger`]).
pub trait Plugin: Send + Sync {
    /// Plugin name, used in logs.
    fn name(&self) -> &'static str {
        "anonymous"
    }

    /// Build the hooks for `app`.
    fn setup(&self, app: &Guarapi, config: &GuarapiConfig) -> PluginHooks;
}

/// A plugin built from a closure.
pub struct FnPlugin<F>(F);

impl<F> fmt::Debug for FnPlugin<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPlugin")
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&Guarapi, &GuarapiConfig) -> PluginHooks + Send + Sync,
{
    fn setup(&self, app: &Guarapi, config: &GuarapiConfig) -> PluginHooks {
        (self.0)(app, config)
    }
}

/// Turn a closure into a [`Plugin`].
pub fn plugin_fn<F>(f: F) -> FnPlugin<F>
where
    F: Fn(&Guarapi, &GuarapiConfig) -> PluginHooks + Send + Sync,
{
    FnPlugin(f)
}

/// Snapshot of the three phase pipelines, taken once per request.
#[derive(Debug, Clone, Default)]
pub struct Phases {
    /// Pre-phase handlers.
    pub pre: Pipeline,
    /// Post-phase handlers.
    pub post: Pipeline,
    /// Error-phase handlers.
    pub error: Pipeline,
}

impl Phases {
    fn slot(&mut self, phase: Phase) -> &mut Pipeline {
        match phase {
            Phase::Pre => &mut self.pre,
            Phase::Post => &mut self.post,
            Phase::Error => &mut self.error,
        }
    }

    /// The pipeline for `phase`.
    #[must_use]
    pub fn get(&self, phase: Phase) -> &Pipeline {
        match phase {
            Phase::Pre => &self.pre,
            Phase::Post => &self.post,
            Phase::Error => &self.error,
        }
    }
}

/// Ordered, append-only store of phase pipelines.
///
/// Registration rebuilds the affected pipeline, so requests already holding
/// a snapshot keep running against the lists they started with.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    phases: RwLock<Phases>,
}

impl PluginRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `plugin.setup` once and append its hooks to their phases.
    ///
    /// Registering the same plugin twice contributes its hooks twice.
    pub fn register<P: Plugin + ?Sized>(&self, plugin: &P, app: &Guarapi, config: &GuarapiConfig) {
        let hooks = plugin.setup(app, config);
        let name = hooks.name.unwrap_or_else(|| plugin.name());
        debug!(
            plugin = name,
            pre = hooks.pre.is_some(),
            post = hooks.post.is_some(),
            error = hooks.error.is_some(),
            "registering plugin"
        );
        self.extend(hooks);
    }

    /// Append the present hooks to their phases.
    pub fn extend(&self, hooks: PluginHooks) {
        let mut phases = self.phases.write();
        for (phase, handler) in [
            (Phase::Pre, hooks.pre),
            (Phase::Post, hooks.post),
            (Phase::Error, hooks.error),
        ] {
            if let Some(handler) = handler {
                append(phases.slot(phase), handler);
            }
        }
    }

    /// Append a single handler to `phase`.
    pub fn push(&self, phase: Phase, handler: Handler) {
        append(self.phases.write().slot(phase), handler);
    }

    /// The current pipelines.
    #[must_use]
    pub fn snapshot(&self) -> Phases {
        self.phases.read().clone()
    }

    /// Number of handlers registered in `phase`.
    #[must_use]
    pub fn len(&self, phase: Phase) -> usize {
        self.phases.read().get(phase).len()
    }

    /// Whether no handler is registered in any phase.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let phases = self.phases.read();
        phases.pre.is_empty() && phases.post.is_empty() && phases.error.is_empty()
    }
}

fn append(pipeline: &mut Pipeline, handler: Handler) {
    let mut handlers = pipeline.to_vec();
    handlers.push(handler);
    *pipeline = handlers.into();
}
