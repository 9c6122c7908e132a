//! Forecasting, self-tuning, and remediation stages for the compliance
//! autopilot.
//!
//! Each module is one stage of the closed feedback loop, kept pure and
//! store-agnostic: the server crate feeds them rows and persists what they
//! return.
//!
//! ```text
//!  check results ──▶ features ──▶ forecast ──▶ risk ──▶ stored forecast
//!                                                          │
//!                       controller ◀── accuracy ◀──────────┘ (after 7d)
//!                           │
//!  check results ──▶ signals ──▶ recommend ──▶ remediation ──▶ impact
//!                       ▲                                        │
//!                       └──────────── feedback ◀─────────────────┘
//!                                 retrain (canary)
//! ```

pub mod accuracy;
pub mod controller;
pub mod features;
pub mod forecast;
pub mod impact;
pub mod recommend;
pub mod remediation;
pub mod retrain;
pub mod risk;
pub mod signals;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use controller::NudgePolicy;
pub use features::TenantFeatures;
pub use forecast::DEFAULT_RELIABILITY;
pub use impact::ImpactOutcome;
pub use recommend::WeightedSignal;
pub use remediation::AutoTriggerVerdict;
pub use risk::RiskAssessment;
