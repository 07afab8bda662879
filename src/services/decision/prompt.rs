//! Persona template rendering.

use crate::types::{Market, Portfolio};

pub const TOTAL_VALUE: &str = "{{totalValue}}";
pub const AVAILABLE_BALANCE: &str = "{{availableBalance}}";
pub const UNREALIZED_PNL: &str = "{{unrealizedPnl}}";
pub const OPEN_POSITIONS: &str = "{{openPositions}}";
pub const MARKET_DATA: &str = "{{marketData}}";

/// Every placeholder a persona template may use.
pub const PLACEHOLDERS: [&str; 5] = [
    TOTAL_VALUE,
    AVAILABLE_BALANCE,
    UNREALIZED_PNL,
    OPEN_POSITIONS,
    MARKET_DATA,
];

/// Fill a persona template with the current portfolio and market rows.
pub fn render_prompt(template: &str, portfolio: &Portfolio, market_data: &[Market]) -> String {
    template
        .replace(TOTAL_VALUE, &format!("${:.2}", portfolio.total_value))
        .replace(AVAILABLE_BALANCE, &format!("${:.2}", portfolio.balance))
        .replace(UNREALIZED_PNL, &signed_usd(portfolio.pnl))
        .replace(OPEN_POSITIONS, &format_positions(portfolio))
        .replace(MARKET_DATA, &format_market(market_data))
}

/// `+$12.50` / `-$3.00`.
pub fn signed_usd(value: f64) -> String {
    if value >= 0.0 {
        format!("+${:.2}", value)
    } else {
        format!("-${:.2}", value.abs())
    }
}

fn format_positions(portfolio: &Portfolio) -> String {
    if portfolio.positions.is_empty() {
        return "None".to_string();
    }
    portfolio
        .positions
        .iter()
        .map(|p| p.describe())
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_market(market_data: &[Market]) -> String {
    market_data
        .iter()
        .map(|m| {
            let sign = if m.price_24h_change >= 0.0 { "+" } else { "" };
            format!(
                " - {}: ${:.4} (24h: {}{:.2}%)",
                m.symbol, m.price, sign, m.price_24h_change
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Placeholders left in a rendered prompt. Non-empty means a broken template.
pub fn unresolved_placeholders(rendered: &str) -> Vec<&'static str> {
    PLACEHOLDERS
        .iter()
        .copied()
        .filter(|p| rendered.contains(p))
        .collect()
}
