//! The configuration subsystem (`C7`): presets, deep merge, a monotonic
//! version counter, a version-keyed derived-config cache, and scoped
//! overlays that shadow the global config without mutating it.

mod presets;
pub use presets::*;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::context::ErrorContext;
use crate::taxonomy::ConfigError;
use crate::ErrorRecord;

/// A user hook invoked after a record is created; may return a replacement
/// record (preserving the brand) or hand back the one it was given.
pub type OnErrorFn = Rc<dyn Fn(ErrorRecord) -> ErrorRecord>;
/// A user hook invoked once per runtime class, purely for side effects.
pub type EnvironmentHandlerFn = Rc<dyn Fn(&ErrorRecord)>;
/// A user function turning a record into a plain, transport-ready mapping.
pub type SerializerFn = Rc<dyn Fn(&ErrorRecord) -> ErrorContext>;

/// Stack-frame extraction and formatting options (`sourceLocation`).
#[derive(Clone)]
pub struct SourceLocationConfig {
    pub stack_offset: usize,
    pub format: String,
    pub include_full_path: bool,
    pub custom_formatter: Option<Rc<dyn Fn(&str, u32, u32) -> String>>,
}

impl Default for SourceLocationConfig {
    fn default() -> Self {
        SourceLocationConfig {
            stack_offset: 1,
            format: "{file}:{line}:{col}".to_owned(),
            include_full_path: false,
            custom_formatter: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct SourceLocationOverlay {
    pub stack_offset: Option<usize>,
    pub format: Option<String>,
    pub include_full_path: Option<bool>,
    pub custom_formatter: Option<Rc<dyn Fn(&str, u32, u32) -> String>>,
}

#[derive(Clone)]
pub struct ErrorCreationConfig {
    pub cache_constructors: bool,
    pub lazy_stack_trace: bool,
    pub object_pooling: bool,
    pub pool_size: usize,
}

impl Default for ErrorCreationConfig {
    fn default() -> Self {
        ErrorCreationConfig {
            cache_constructors: true,
            lazy_stack_trace: false,
            object_pooling: false,
            pool_size: crate::pool::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Clone, Default)]
pub struct ErrorCreationOverlay {
    pub cache_constructors: Option<bool>,
    pub lazy_stack_trace: Option<bool>,
    pub object_pooling: Option<bool>,
    pub pool_size: Option<usize>,
}

#[derive(Clone)]
pub struct ContextCaptureConfig {
    pub max_context_size: usize,
    pub deep_clone: bool,
    pub timeout: Duration,
}

impl Default for ContextCaptureConfig {
    fn default() -> Self {
        ContextCaptureConfig {
            max_context_size: 64 * 1024,
            deep_clone: true,
            timeout: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Default)]
pub struct ContextCaptureOverlay {
    pub max_context_size: Option<usize>,
    pub deep_clone: Option<bool>,
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct MemoryConfig {
    pub max_error_history: usize,
    pub use_weak_refs: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig { max_error_history: 1000, use_weak_refs: false }
    }
}

#[derive(Clone, Default)]
pub struct MemoryOverlay {
    pub max_error_history: Option<usize>,
    pub use_weak_refs: Option<bool>,
}

#[derive(Clone, Default)]
pub struct PerformanceConfig {
    pub error_creation: ErrorCreationConfig,
    pub context_capture: ContextCaptureConfig,
    pub memory: MemoryConfig,
}

#[derive(Clone, Default)]
pub struct PerformanceOverlay {
    pub error_creation: Option<ErrorCreationOverlay>,
    pub context_capture: Option<ContextCaptureOverlay>,
    pub memory: Option<MemoryOverlay>,
}

/// Per-runtime post-creation hooks (`environmentHandlers`).
#[derive(Clone, Default)]
pub struct EnvironmentHandlers {
    pub server: Option<EnvironmentHandlerFn>,
    pub client: Option<EnvironmentHandlerFn>,
    pub edge: Option<EnvironmentHandlerFn>,
}

#[derive(Clone, Default)]
pub struct EnvironmentHandlersOverlay {
    pub server: Option<Option<EnvironmentHandlerFn>>,
    pub client: Option<Option<EnvironmentHandlerFn>>,
    pub edge: Option<Option<EnvironmentHandlerFn>>,
}

/// The effective configuration consulted by [`crate::factory::create_error`].
#[derive(Clone)]
pub struct Config {
    pub capture_stack_trace: bool,
    pub stack_trace_limit: usize,
    pub include_source: bool,
    pub minimal_errors: bool,
    pub skip_timestamp: bool,
    pub skip_context: bool,
    pub source_location: SourceLocationConfig,
    pub default_error_type: String,
    pub development_mode: bool,
    pub serializer: Option<SerializerFn>,
    pub on_error: Option<OnErrorFn>,
    pub runtime_detection: bool,
    pub environment_handlers: EnvironmentHandlers,
    pub performance: PerformanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            capture_stack_trace: true,
            stack_trace_limit: 10,
            include_source: true,
            minimal_errors: false,
            skip_timestamp: false,
            skip_context: false,
            source_location: SourceLocationConfig::default(),
            default_error_type: "Error".to_owned(),
            development_mode: false,
            serializer: None,
            on_error: None,
            runtime_detection: false,
            environment_handlers: EnvironmentHandlers::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

/// A partial configuration; every field is optional and only present fields
/// override the value being merged onto (`configure`'s deep-merge contract).
#[derive(Clone, Default)]
pub struct ConfigOverlay {
    pub capture_stack_trace: Option<bool>,
    pub stack_trace_limit: Option<usize>,
    pub include_source: Option<bool>,
    pub minimal_errors: Option<bool>,
    pub skip_timestamp: Option<bool>,
    pub skip_context: Option<bool>,
    pub source_location: Option<SourceLocationOverlay>,
    pub default_error_type: Option<String>,
    pub development_mode: Option<bool>,
    pub serializer: Option<Option<SerializerFn>>,
    pub on_error: Option<Option<OnErrorFn>>,
    pub runtime_detection: Option<bool>,
    pub environment_handlers: Option<EnvironmentHandlersOverlay>,
    pub performance: Option<PerformanceOverlay>,
}

impl Config {
    /// Applies `overlay` onto `self`, recursing into nested sections, and
    /// returns the merged result. `self` is left untouched.
    pub fn merged_with(&self, overlay: &ConfigOverlay) -> Config {
        let mut out = self.clone();
        if let Some(v) = overlay.capture_stack_trace {
            out.capture_stack_trace = v;
        }
        if let Some(v) = overlay.stack_trace_limit {
            out.stack_trace_limit = v;
        }
        if let Some(v) = overlay.include_source {
            out.include_source = v;
        }
        if let Some(v) = overlay.minimal_errors {
            out.minimal_errors = v;
        }
        if let Some(v) = overlay.skip_timestamp {
            out.skip_timestamp = v;
        }
        if let Some(v) = overlay.skip_context {
            out.skip_context = v;
        }
        if let Some(loc) = &overlay.source_location {
            if let Some(v) = loc.stack_offset {
                out.source_location.stack_offset = v;
            }
            if let Some(v) = &loc.format {
                out.source_location.format = v.clone();
            }
            if let Some(v) = loc.include_full_path {
                out.source_location.include_full_path = v;
            }
            if loc.custom_formatter.is_some() {
                out.source_location.custom_formatter = loc.custom_formatter.clone();
            }
        }
        if let Some(v) = &overlay.default_error_type {
            out.default_error_type = v.clone();
        }
        if let Some(v) = overlay.development_mode {
            out.development_mode = v;
        }
        if let Some(v) = &overlay.serializer {
            out.serializer = v.clone();
        }
        if let Some(v) = &overlay.on_error {
            out.on_error = v.clone();
        }
        if let Some(v) = overlay.runtime_detection {
            out.runtime_detection = v;
        }
        if let Some(handlers) = &overlay.environment_handlers {
            if let Some(v) = &handlers.server {
                out.environment_handlers.server = v.clone();
            }
            if let Some(v) = &handlers.client {
                out.environment_handlers.client = v.clone();
            }
            if let Some(v) = &handlers.edge {
                out.environment_handlers.edge = v.clone();
            }
        }
        if let Some(perf) = &overlay.performance {
            if let Some(ec) = &perf.error_creation {
                if let Some(v) = ec.cache_constructors {
                    out.performance.error_creation.cache_constructors = v;
                }
                if let Some(v) = ec.lazy_stack_trace {
                    out.performance.error_creation.lazy_stack_trace = v;
                }
                if let Some(v) = ec.object_pooling {
                    out.performance.error_creation.object_pooling = v;
                }
                if let Some(v) = ec.pool_size {
                    out.performance.error_creation.pool_size = v;
                }
            }
            if let Some(cc) = &perf.context_capture {
                if let Some(v) = cc.max_context_size {
                    out.performance.context_capture.max_context_size = v;
                }
                if let Some(v) = cc.deep_clone {
                    out.performance.context_capture.deep_clone = v;
                }
                if let Some(v) = cc.timeout {
                    out.performance.context_capture.timeout = v;
                }
            }
            if let Some(mem) = &perf.memory {
                if let Some(v) = mem.max_error_history {
                    out.performance.memory.max_error_history = v;
                }
                if let Some(v) = mem.use_weak_refs {
                    out.performance.memory.use_weak_refs = v;
                }
            }
        }
        out
    }
}

/// A monotonically increasing configuration version, used to key the
/// derived-config cache (`P7`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConfigVersion(pub u64);

struct State {
    config: Config,
    version: u64,
    cache: Option<(u64, Rc<Config>)>,
    listeners: Vec<Rc<dyn Fn(&Config)>>,
}

impl State {
    fn new() -> Self {
        State { config: Config::default(), version: 0, cache: None, listeners: Vec::new() }
    }
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::new());
}

/// What [`configure`] accepts: a registered preset name, or a partial
/// overlay to deep-merge onto the current config.
pub enum Configure<'a> {
    Preset(&'a str),
    Overlay(ConfigOverlay),
}

impl<'a> From<&'a str> for Configure<'a> {
    fn from(name: &'a str) -> Self {
        Configure::Preset(name)
    }
}
impl From<ConfigOverlay> for Configure<'static> {
    fn from(overlay: ConfigOverlay) -> Self {
        Configure::Overlay(overlay)
    }
}

/// Replaces the active configuration, deep-merging `input` onto the current
/// value, bumping [`get_config_version`], invalidating the derived-config
/// cache, and notifying registered listeners (`§4.7`).
pub fn configure<'a>(input: impl Into<Configure<'a>>) -> Result<(), ConfigError> {
    let overlay = match input.into() {
        Configure::Preset(name) => preset_by_name(name).ok_or_else(|| {
            ConfigError::UnknownPreset(name.to_owned())
        })?,
        Configure::Overlay(overlay) => overlay,
    };
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.config = state.config.merged_with(&overlay);
        state.version += 1;
        state.cache = None;
        let listeners = state.listeners.clone();
        let config = state.config.clone();
        drop(state);
        for listener in listeners {
            listener(&config);
        }
    });
    Ok(())
}

/// Returns the current effective configuration.
pub fn get_config() -> Config {
    STATE.with(|state| state.borrow().config.clone())
}

/// Returns a cheaply-cloneable derived configuration, cached by
/// [`get_config_version`]. Recomputes (clones) only after `configure`.
pub fn get_cached_config() -> Rc<Config> {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        if let Some((version, cached)) = &state.cache {
            if *version == state.version {
                return cached.clone();
            }
        }
        let fresh = Rc::new(state.config.clone());
        state.cache = Some((state.version, fresh.clone()));
        fresh
    })
}

/// Restores the default configuration and bumps the version counter.
pub fn reset_config() {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.config = Config::default();
        state.version += 1;
        state.cache = None;
    });
}

/// The current configuration version (`P7`).
pub fn get_config_version() -> ConfigVersion {
    STATE.with(|state| ConfigVersion(state.borrow().version))
}

/// Registers a listener invoked with the new config after every successful
/// [`configure`] call.
pub fn on_configure(listener: impl Fn(&Config) + 'static) {
    STATE.with(|state| state.borrow_mut().listeners.push(Rc::new(listener)));
}

/// A factory bound to a config overlay that shadows the global config for
/// operations performed through it, without mutating the global (`§4.7`).
#[derive(Clone)]
pub struct ConfigScope {
    overlay: ConfigOverlay,
}

impl ConfigScope {
    /// The effective configuration for this scope: the global config with
    /// the scope's overlay merged on top.
    pub fn effective_config(&self) -> Config {
        get_config().merged_with(&self.overlay)
    }

    /// Builds an [`ErrorRecord`] the way [`crate::create_error`] would, but
    /// against this scope's overlaid configuration rather than the global
    /// derived cache. The global config is left untouched (`§4.7`).
    pub fn create_error(&self, options: crate::factory::CreateErrorOptions) -> ErrorRecord {
        crate::factory::create_error_with_config(&self.effective_config(), options)
    }
}

/// Creates a [`ConfigScope`] overlaying `overlay` onto the global config for
/// every operation performed through the scope's own factory entry points.
pub fn create_scope(overlay: ConfigOverlay) -> ConfigScope {
    ConfigScope { overlay }
}

/// Selects a preset based on which of `development`/`production`/`test` the
/// host environment indicates (via the `TRY_RAIL_ENV` environment variable,
/// falling back to `development`).
pub fn create_env_config(development: &str, production: &str, test: &str) -> Result<(), ConfigError> {
    let env = std::env::var("TRY_RAIL_ENV").unwrap_or_else(|_| "development".to_owned());
    let preset = match env.as_str() {
        "production" => production,
        "test" => test,
        _ => development,
    };
    configure(preset)
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    STATE.with(|state| *state.borrow_mut() = State::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_bumps_version_and_invalidates_cache() {
        reset_for_test();
        let before = get_config_version();
        let cached_before = get_cached_config();
        configure(ConfigOverlay { minimal_errors: Some(true), ..Default::default() }).unwrap();
        let after = get_config_version();
        assert!(after.0 > before.0);
        let cached_after = get_cached_config();
        assert!(!Rc::ptr_eq(&cached_before, &cached_after));
        assert!(get_config().minimal_errors);
    }

    #[test]
    fn unknown_preset_fails() {
        reset_for_test();
        let err = configure("not-a-real-preset").unwrap_err();
        assert_eq!(err, ConfigError::UnknownPreset("not-a-real-preset".to_owned()));
    }

    #[test]
    fn scope_overlay_does_not_mutate_global() {
        reset_for_test();
        let scope = create_scope(ConfigOverlay {
            minimal_errors: Some(true),
            ..Default::default()
        });
        assert!(scope.effective_config().minimal_errors);
        assert!(!get_config().minimal_errors);
    }

    #[test]
    fn reset_restores_defaults() {
        reset_for_test();
        configure(ConfigOverlay { minimal_errors: Some(true), ..Default::default() }).unwrap();
        reset_config();
        assert!(!get_config().minimal_errors);
    }
}
