//! Summary text for the loading screen
//!
//! Numbers follow ru-RU conventions: NBSP digit groups and a decimal comma.
//! Non-finite values render as `—`.

use serde::Serialize;

use crate::recalc::Reconciliation;

/// ru-RU group separator
pub const GROUP_SEPARATOR: char = '\u{a0}';

const PLACEHOLDER: &str = "—";

// ─── Number formatting ───────────────────────────────────────────────

/// Round to an integer and group digits: `12000.4` → `"12 000"`
pub fn group_digits(value: f64) -> String {
    format_fixed(value, 0)
}

/// Fixed decimals with grouped integer part: `(12600.5, 3)` → `"12 600,500"`
pub fn format_fixed(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(ch);
    }

    // "-0" after rounding reads as zero
    let sign = if grouped.chars().all(|c| c == '0') && frac_part.map_or(true, |f| f.chars().all(|c| c == '0')) {
        ""
    } else {
        sign
    };

    match frac_part {
        Some(f) => format!("{}{},{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

fn with_unit(value: f64, decimals: usize, unit: &str) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    format!("{} {}", format_fixed(value, decimals), unit)
}

pub fn fmt_liters(value: f64) -> String {
    with_unit(value, 0, "л")
}

pub fn fmt_kg(value: f64) -> String {
    with_unit(value, 0, "кг")
}

/// Tons with 3 decimals
pub fn fmt_tons(value: f64) -> String {
    with_unit(value, 3, "т")
}

/// Tons with 2 decimals (totals line and brief)
pub fn fmt_tons_short(value: f64) -> String {
    with_unit(value, 2, "т")
}

pub fn fmt_m3(value: f64) -> String {
    with_unit(value, 3, "м³")
}

/// Density as typed: `0.84` → `"0,84"`
pub fn fmt_density(value: f64) -> String {
    value.to_string().replace('.', ",")
}

// ─── Report ──────────────────────────────────────────────────────────

/// Context for the copyable brief
#[derive(Debug, Clone, Default)]
pub struct BriefHeader<'a> {
    pub trailer_name: Option<&'a str>,
    pub tractor_plate: Option<&'a str>,
    pub cargo_label: Option<&'a str>,
    pub density: Option<f64>,
}

/// Rendered summary lines
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub totals_line: String,
    pub fit_summary: String,
    pub brief: String,
}

/// Render the totals line, fit summary and brief for one reconciliation
pub fn render(rec: &Reconciliation, header: &BriefHeader<'_>) -> Report {
    let t = &rec.totals;
    let l = &rec.leftover;

    let (totals_line, fit_summary) = match rec.platform_positions {
        Some(positions) => (
            format!("Всего: {} / {} · Позиции: {}", fmt_kg(t.kg), fmt_tons_short(t.tons), positions),
            format!("Всего: {} ({})", fmt_tons(t.tons), fmt_kg(t.kg)),
        ),
        None => {
            let totals_line = format!(
                "Всего: {} / {} / {} / {} · Не поместилось: {} / {} / {} / {}",
                fmt_liters(t.liters),
                fmt_kg(t.kg),
                fmt_tons_short(t.tons),
                fmt_m3(t.m3),
                fmt_liters(l.liters),
                fmt_kg(l.kg),
                fmt_tons_short(l.tons),
                fmt_m3(l.m3),
            );
            let mut parts = vec![
                format!("Всего: {} ({})", fmt_tons(t.tons), fmt_kg(t.kg)),
                format!("Объём: {} ({})", fmt_m3(t.m3), fmt_liters(t.liters)),
            ];
            if l.liters > 0.0 {
                parts.push(format!("Не поместилось: {} ({})", fmt_m3(l.m3), fmt_liters(l.liters)));
            }
            (totals_line, parts.join(" · "))
        }
    };

    Report {
        totals_line,
        fit_summary,
        brief: brief(rec, header),
    }
}

fn brief(rec: &Reconciliation, header: &BriefHeader<'_>) -> String {
    let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let mut lines = Vec::new();
    if let Some(name) = non_empty(header.trailer_name) {
        lines.push(format!("Прицеп: {}", name));
    }
    if let Some(plate) = non_empty(header.tractor_plate) {
        lines.push(format!("Тягач: {}", plate));
    }
    if let Some(label) = non_empty(header.cargo_label) {
        lines.push(format!("Груз: {}", label));
    }
    if let Some(rho) = header.density.filter(|d| d.is_finite()) {
        lines.push(format!("ρ: {} кг/л", fmt_density(rho)));
    }
    lines.push(format!("Масса: {} ({})", fmt_tons_short(rec.totals.tons), fmt_kg(rec.totals.kg)));
    if rec.platform_positions.is_none() {
        lines.push(format!("Объём: {} ({})", fmt_m3(rec.totals.m3), fmt_liters(rec.totals.liters)));
        if rec.leftover.liters > 0.0 {
            lines.push(format!(
                "Не поместилось: {} ({})",
                fmt_m3(rec.leftover.m3),
                fmt_liters(rec.leftover.liters)
            ));
        }
    }
    lines.join("\n")
}

/// One-off notice after a bulk distribution that did not fit
pub fn overflow_notice(rec: &Reconciliation) -> Option<String> {
    (rec.leftover.liters > 0.0).then(|| format!("Не поместилось: {} л", group_digits(rec.leftover.liters)))
}
