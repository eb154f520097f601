//! Named configuration presets (`§3.1`, `§6`). Each preset is a plain
//! function producing a fresh, independent [`ConfigOverlay`] — never a
//! shared mutable value.

use super::{ConfigOverlay, ContextCaptureOverlay, ErrorCreationOverlay, PerformanceOverlay};

/// The registered preset names, in the order `§6` lists them.
pub const PRESET_NAMES: &[&str] = &[
    "development",
    "production",
    "test",
    "performance",
    "minimal",
    "serverProduction",
    "clientProduction",
    "edge",
    "nextjs",
];

/// Resolves a preset name to its overlay, or `None` if unregistered.
pub fn preset_by_name(name: &str) -> Option<ConfigOverlay> {
    match name {
        "development" => Some(development()),
        "production" => Some(production()),
        "test" => Some(test()),
        "performance" => Some(performance()),
        "minimal" => Some(minimal()),
        "serverProduction" => Some(server_production()),
        "clientProduction" => Some(client_production()),
        "edge" => Some(edge()),
        "nextjs" => Some(nextjs()),
        _ => None,
    }
}

/// Verbose diagnostics: full stack capture, eager context, no pooling.
pub fn development() -> ConfigOverlay {
    ConfigOverlay {
        capture_stack_trace: Some(true),
        include_source: Some(true),
        development_mode: Some(true),
        performance: Some(PerformanceOverlay {
            error_creation: Some(ErrorCreationOverlay {
                lazy_stack_trace: Some(false),
                object_pooling: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Lean runtime defaults: lazy stacks, pooling on, no dev diagnostics.
pub fn production() -> ConfigOverlay {
    ConfigOverlay {
        capture_stack_trace: Some(true),
        include_source: Some(false),
        development_mode: Some(false),
        performance: Some(PerformanceOverlay {
            error_creation: Some(ErrorCreationOverlay {
                lazy_stack_trace: Some(true),
                object_pooling: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Deterministic, synchronous-friendly: no lazy fields, no pooling, full
/// source capture for assertions.
pub fn test() -> ConfigOverlay {
    ConfigOverlay {
        capture_stack_trace: Some(true),
        include_source: Some(true),
        development_mode: Some(true),
        performance: Some(PerformanceOverlay {
            error_creation: Some(ErrorCreationOverlay {
                lazy_stack_trace: Some(false),
                object_pooling: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Maximum throughput: pooling, interning, lazy fields, small context
/// budget, minimal stack depth.
pub fn performance() -> ConfigOverlay {
    ConfigOverlay {
        capture_stack_trace: Some(true),
        stack_trace_limit: Some(3),
        include_source: Some(false),
        performance: Some(PerformanceOverlay {
            error_creation: Some(ErrorCreationOverlay {
                lazy_stack_trace: Some(true),
                object_pooling: Some(true),
                ..Default::default()
            }),
            context_capture: Some(ContextCaptureOverlay {
                max_context_size: Some(4 * 1024),
                deep_clone: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Forces the `IsMinimal` fast path regardless of every other switch.
pub fn minimal() -> ConfigOverlay {
    ConfigOverlay { minimal_errors: Some(true), ..Default::default() }
}

/// `production` tuned for a multi-threaded server host.
pub fn server_production() -> ConfigOverlay {
    ConfigOverlay { runtime_detection: Some(true), ..production() }
}

/// `production` tuned for a browser-like single-threaded host.
pub fn client_production() -> ConfigOverlay {
    ConfigOverlay {
        runtime_detection: Some(true),
        capture_stack_trace: Some(false),
        ..production()
    }
}

/// Edge/worker runtime: minimal capture, no pooling (short-lived isolate).
pub fn edge() -> ConfigOverlay {
    ConfigOverlay {
        runtime_detection: Some(true),
        capture_stack_trace: Some(false),
        include_source: Some(false),
        performance: Some(PerformanceOverlay {
            error_creation: Some(ErrorCreationOverlay {
                object_pooling: Some(false),
                lazy_stack_trace: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Next.js-shaped hosts: same as `serverProduction` with runtime detection
/// always on, since server/client/edge all coexist in one build.
pub fn nextjs() -> ConfigOverlay {
    ConfigOverlay { runtime_detection: Some(true), ..server_production() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_name_resolves() {
        for name in PRESET_NAMES {
            assert!(preset_by_name(name).is_some(), "{name} should resolve");
        }
    }

    #[test]
    fn unregistered_name_does_not_resolve() {
        assert!(preset_by_name("not-a-preset").is_none());
    }

    #[test]
    fn minimal_preset_forces_minimal_errors() {
        assert_eq!(minimal().minimal_errors, Some(true));
    }
}
