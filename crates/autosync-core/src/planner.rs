//! Plan builder: turns module status plus a dependency order into an ordered plan.
//!
//! Priority bands per dependency index `i`:
//!
//! | condition          | action       | priority    | reason             |
//! |--------------------|--------------|-------------|--------------------|
//! | no status          | `SKIP`       | `100 + i`   | `status_missing`   |
//! | health `RED`       | `PATCH`      | `i * 10`    | `health_red`       |
//! | health `YELLOW`    | `PATCH`      | `i * 10 + 5`| `health_yellow`    |
//! | target != current  | `PATCH`      | `i * 10 + 7`| `version_mismatch` |
//! | otherwise          | `CHECK_ONLY` | `i * 10 + 50`| `ok_no_action`    |

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::domain::{Health, HealthStore, ModuleStatus, Plan, PlanAction, PlanItem};
use crate::error::Result;

pub const REASON_STATUS_MISSING: &str = "status_missing";
pub const REASON_HEALTH_RED: &str = "health_red";
pub const REASON_HEALTH_YELLOW: &str = "health_yellow";
pub const REASON_VERSION_MISMATCH: &str = "version_mismatch";
pub const REASON_OK: &str = "ok_no_action";

/// Build a plan from already-loaded statuses. Pure and deterministic.
pub fn build_plan(order: &[String], statuses: &BTreeMap<String, ModuleStatus>) -> Plan {
    let mut seen = HashSet::new();
    let mut serial_order = Vec::with_capacity(order.len());
    let mut items = Vec::with_capacity(order.len());

    for name in order {
        if !seen.insert(name.as_str()) {
            warn!(module = %name, "duplicate module in dependency order ignored");
            continue;
        }
        let index = serial_order.len() as u32;
        serial_order.push(name.clone());
        items.push(plan_item(index, name, statuses.get(name)));
    }

    let mut plan = Plan {
        serial_order,
        items,
    };
    plan.sort();
    plan
}

fn plan_item(index: u32, name: &str, status: Option<&ModuleStatus>) -> PlanItem {
    let Some(status) = status else {
        return PlanItem {
            module: name.to_string(),
            action: PlanAction::Skip,
            priority: 100 + index,
            reason: REASON_STATUS_MISSING.to_string(),
            target_version: None,
        };
    };

    let base = index * 10;
    let (action, priority, reason) = match status.health {
        Health::Red => (PlanAction::Patch, base, REASON_HEALTH_RED),
        Health::Yellow => (PlanAction::Patch, base + 5, REASON_HEALTH_YELLOW),
        _ if status.version_mismatch() => (PlanAction::Patch, base + 7, REASON_VERSION_MISMATCH),
        _ => (PlanAction::CheckOnly, base + 50, REASON_OK),
    };
    debug!(module = %name, action = %action, priority, reason, "planned module");

    PlanItem {
        module: name.to_string(),
        action,
        priority,
        reason: reason.to_string(),
        target_version: status.target_version.clone(),
    }
}

/// Plan builder bound to a health store.
pub struct PlanBuilder<'a, S: HealthStore + ?Sized> {
    store: &'a S,
    order: &'a [String],
}

impl<'a, S: HealthStore + ?Sized> PlanBuilder<'a, S> {
    pub fn new(store: &'a S, order: &'a [String]) -> Self {
        Self { store, order }
    }

    pub fn build(&self) -> Result<Plan> {
        let statuses = self.store.load()?;
        Ok(build_plan(self.order, &statuses))
    }
}
