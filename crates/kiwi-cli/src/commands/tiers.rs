//! Tier table command

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use kiwi_core::services::{RateLimitGroup, TierPolicy};

use crate::output::{print_output, OutputFormat};

/// Tier row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct TierRow {
    #[tabled(rename = "Tier")]
    pub tier: String,
    #[tabled(rename = "Daily Limit")]
    #[serde(skip)]
    pub display: String,
    #[tabled(skip)]
    pub limit: i64,
}

/// Rate limit row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct RateRow {
    #[tabled(rename = "Group")]
    pub group: String,
    #[tabled(rename = "Default / minute")]
    pub per_minute: u32,
}

pub fn execute(format: OutputFormat) -> Result<()> {
    let rows: Vec<TierRow> = TierPolicy::default()
        .table()
        .into_iter()
        .map(|(tier, limit)| TierRow {
            tier: tier.to_string(),
            display: limit.to_string(),
            limit: limit.as_wire(),
        })
        .collect();
    print_output(&rows, format)?;

    if format == OutputFormat::Table {
        let rates: Vec<RateRow> = RateLimitGroup::ALL
            .iter()
            .map(|group| RateRow {
                group: group.to_string(),
                per_minute: group.default_per_minute(),
            })
            .collect();
        print_output(&rates, format)?;
    }
    Ok(())
}
