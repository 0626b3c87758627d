//! Deterministic buy/wait scoring for one target currency.

use rust_decimal::Decimal;

use super::types::{FxExposure, FxInvoicePressure, FxRate};

/// Gap versus the 30-day average that counts as favourable pricing.
fn gap_buy_threshold() -> Decimal {
    Decimal::new(1, 2)
}

fn gap_strong_threshold() -> Decimal {
    Decimal::new(2, 2)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalInputs {
    pub currency: String,
    pub current_rate: Option<Decimal>,
    pub avg_30d_rate: Option<Decimal>,
    pub exposure_amount: Option<Decimal>,
    pub exposure_30d_amount: Decimal,
    pub invoice_pressure_30d: Decimal,
    pub invoice_pressure_60d: Decimal,
    pub invoice_pressure_90d: Decimal,
}

impl SignalInputs {
    /// Assemble inputs from recent rates (newest first) and the exposure and pressure views.
    pub fn from_sources(
        currency: &str,
        recent_rates: &[FxRate],
        exposure: Option<&FxExposure>,
        pressure: Option<&FxInvoicePressure>,
    ) -> Self {
        let current_rate = recent_rates.first().and_then(|r| r.mid_rate);
        let mids: Vec<Decimal> = recent_rates.iter().filter_map(|r| r.mid_rate).collect();
        let avg_30d_rate = if mids.is_empty() {
            None
        } else {
            Some(mids.iter().copied().sum::<Decimal>() / Decimal::from(mids.len()))
        };

        let exposure_amount = match exposure {
            Some(row) => row.net_exposure,
            None => Some(Decimal::ZERO),
        };
        let exposure_30d_amount = exposure
            .map(|row| {
                row.confirmed_30d.unwrap_or_default() + row.estimated_30d.unwrap_or_default()
            })
            .unwrap_or_default();
        let pressure_amount = |pick: fn(&FxInvoicePressure) -> Option<Decimal>| {
            pressure.and_then(pick).unwrap_or_default()
        };

        Self {
            currency: currency.to_string(),
            current_rate,
            avg_30d_rate,
            exposure_amount,
            exposure_30d_amount,
            invoice_pressure_30d: pressure_amount(|p| p.due_30d_amount),
            invoice_pressure_60d: pressure_amount(|p| p.due_60d_amount),
            invoice_pressure_90d: pressure_amount(|p| p.due_90d_amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalScore {
    pub signal_type: &'static str,
    pub signal_strength: &'static str,
    pub confidence: Decimal,
    pub recommended_amount: Decimal,
    pub gap_pct: Decimal,
    pub reason_summary: String,
    pub reasoning: String,
}

fn display(value: Option<Decimal>) -> String {
    value
        .map(|v| v.normalize().to_string())
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn score_signal(inputs: &SignalInputs) -> SignalScore {
    let gap_pct = match (inputs.current_rate, inputs.avg_30d_rate) {
        (Some(current), Some(avg)) if !avg.is_zero() => (avg - current) / avg,
        _ => Decimal::ZERO,
    };

    let should_buy = inputs.exposure_amount.is_some_and(|e| e > Decimal::ZERO)
        && inputs.current_rate.is_some()
        && inputs.avg_30d_rate.is_some()
        && (gap_pct >= gap_buy_threshold() || inputs.invoice_pressure_30d > Decimal::ZERO);

    let confidence = match (should_buy, gap_pct >= gap_strong_threshold()) {
        (false, _) => Decimal::new(55, 2),
        (true, true) => Decimal::new(82, 2),
        (true, false) => Decimal::new(72, 2),
    };

    let recommended_amount = match (should_buy, inputs.exposure_amount) {
        (true, Some(exposure)) => exposure
            .min(inputs.invoice_pressure_30d.max(inputs.exposure_30d_amount))
            .max(Decimal::ZERO),
        _ => Decimal::ZERO,
    };

    let signal_strength = if confidence >= Decimal::new(8, 1) {
        "high"
    } else if confidence >= Decimal::new(65, 2) {
        "medium"
    } else {
        "low"
    };

    let reason_summary = if should_buy {
        format!(
            "{}: favorable pricing vs 30d average with upcoming payable pressure.",
            inputs.currency
        )
    } else {
        format!(
            "{}: wait for stronger pricing signal or clearer near-term pressure.",
            inputs.currency
        )
    };
    let reasoning = format!(
        "Current rate={}, avg30d={}, gapPct={}, netExposure={}, invoicePressure30d={}.",
        display(inputs.current_rate),
        display(inputs.avg_30d_rate),
        gap_pct.round_dp(6).normalize(),
        display(inputs.exposure_amount),
        inputs.invoice_pressure_30d.normalize(),
    );

    SignalScore {
        signal_type: if should_buy { "buy_now" } else { "wait" },
        signal_strength,
        confidence,
        recommended_amount,
        gap_pct,
        reason_summary,
        reasoning,
    }
}

/// Up to five distinct trend tags and five distinct source links, newest item first.
pub fn collect_context<'a, I>(items: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = (&'a [String], &'a str)>,
{
    let mut tags: Vec<String> = Vec::new();
    let mut links: Vec<String> = Vec::new();
    for (item_tags, url) in items {
        for tag in item_tags {
            let normalized = tag.trim();
            if !normalized.is_empty() && !tags.iter().any(|t| t == normalized) {
                tags.push(normalized.to_string());
            }
        }
        if !url.is_empty() && !links.iter().any(|l| l == url) {
            links.push(url.to_string());
        }
        if tags.len() >= 5 && links.len() >= 5 {
            break;
        }
    }
    tags.truncate(5);
    links.truncate(5);
    (tags, links)
}
