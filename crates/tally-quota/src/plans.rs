// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feature flags gated by plan.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tally_config::model::PlanLimits;

/// A plan-gated capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Feature {
    WebSearch,
    BrokerSync,
    CsvExport,
}

impl Feature {
    pub fn allowed_by(self, limits: &PlanLimits) -> bool {
        match self {
            Feature::WebSearch => limits.allow_web_search,
            Feature::BrokerSync => limits.allow_broker_sync,
            Feature::CsvExport => limits.allow_csv_export,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_has_no_gated_features() {
        let free = PlanLimits::free();
        assert!(!Feature::WebSearch.allowed_by(&free));
        assert!(!Feature::BrokerSync.allowed_by(&free));
        assert!(!Feature::CsvExport.allowed_by(&free));
        assert!(Feature::CsvExport.allowed_by(&PlanLimits::pro()));
    }

    #[test]
    fn feature_names_are_snake_case() {
        assert_eq!(Feature::WebSearch.to_string(), "web_search");
        assert_eq!("broker_sync".parse::<Feature>().unwrap(), Feature::BrokerSync);
    }
}
