//! What the adapter said it can do in its `initialize` response.

use std::collections::BTreeSet;
use std::fmt;

use crate::protocol::Capabilities;

/// Optional adapter features the driver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    ConfigurationDone,
    ConditionalBreakpoints,
    HitConditionalBreakpoints,
    LogPoints,
    FunctionBreakpoints,
    StepBack,
    SetVariable,
    Terminate,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::ConfigurationDone,
        Feature::ConditionalBreakpoints,
        Feature::HitConditionalBreakpoints,
        Feature::LogPoints,
        Feature::FunctionBreakpoints,
        Feature::StepBack,
        Feature::SetVariable,
        Feature::Terminate,
    ];

    /// Short name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Feature::ConfigurationDone => "configurationDone",
            Feature::ConditionalBreakpoints => "conditionalBreakpoints",
            Feature::HitConditionalBreakpoints => "hitConditionalBreakpoints",
            Feature::LogPoints => "logPoints",
            Feature::FunctionBreakpoints => "functionBreakpoints",
            Feature::StepBack => "stepBack",
            Feature::SetVariable => "setVariable",
            Feature::Terminate => "terminate",
        }
    }

    fn flag(self, caps: &Capabilities) -> Option<bool> {
        match self {
            Feature::ConfigurationDone => caps.supports_configuration_done_request,
            Feature::ConditionalBreakpoints => caps.supports_conditional_breakpoints,
            Feature::HitConditionalBreakpoints => caps.supports_hit_conditional_breakpoints,
            Feature::LogPoints => caps.supports_log_points,
            Feature::FunctionBreakpoints => caps.supports_function_breakpoints,
            Feature::StepBack => caps.supports_step_back,
            Feature::SetVariable => caps.supports_set_variable,
            Feature::Terminate => caps.supports_terminate_request,
        }
    }
}

/// Adapter capabilities reduced to a feature set plus the exception filters
/// on offer. An absent flag counts as unsupported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DapCapabilities {
    features: BTreeSet<Feature>,
    exception_filters: Vec<String>,
}

impl DapCapabilities {
    pub fn from_initialize_response(caps: &Capabilities) -> Self {
        Self {
            features: Feature::ALL
                .into_iter()
                .filter(|f| f.flag(caps).unwrap_or(false))
                .collect(),
            exception_filters: caps
                .exception_breakpoint_filters
                .iter()
                .flatten()
                .map(|f| f.filter.clone())
                .collect(),
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn exception_filters(&self) -> &[String] {
        &self.exception_filters
    }

    /// Whether the adapter advertised the given exception filter.
    pub fn offers_exception_filter(&self, filter: &str) -> bool {
        self.exception_filters.iter().any(|f| f == filter)
    }
}

impl fmt::Display for DapCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.features.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.features.iter().map(|feat| feat.name()).collect();
        f.write_str(&names.join(","))
    }
}
