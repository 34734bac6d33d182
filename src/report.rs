use crate::grouping::GroupSummary;
use crate::pivot::{AnnualPivot, Category, CategorySelection, Metric, MonthlyClassRow};
use crate::selection::{Portfolio, SelectionState};
use crate::sort::{leader, SortSpec};
use crate::value::Record;
use chrono::NaiveDate;
use comfy_table::{
    presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor, ContentArrangement, Table,
};
use std::collections::HashMap;

pub const FIXED_INCOME_COLUMNS: [(&str, &str); 8] = [
    ("Distribuidor", "distributor"),
    ("Emissor", "issuer"),
    ("Investimento", "investment_type"),
    ("Tipo", "rate_type"),
    ("Data aporte", "date_aporte"),
    ("Aporte", "active_applied_value"),
    ("Data final", "maturity_date"),
    ("Atual bruto", "current_gross_value"),
];

pub const POSITION_COLUMNS: [(&str, &str); 10] = [
    ("Ticker", "ticker"),
    ("Nome", "name"),
    ("Qtd", "shares"),
    ("Preco", "price"),
    ("Preco medio", "avg_price"),
    ("Investido", "invested_value"),
    ("Total", "value"),
    ("Proventos", "total_incomes"),
    ("Aberto", "open_pnl_value"),
    ("Peso", "weight"),
];

pub const ASSET_COLUMNS: [(&str, &str); 11] = [
    ("Ticker", "ticker"),
    ("Nome", "name"),
    ("Setor", "sector"),
    ("Preco", "price"),
    ("DY", "dy"),
    ("P/L", "pl"),
    ("P/VP", "pvp"),
    ("Proventos", "incomes"),
    ("Dia", "variation_day"),
    ("7 dias", "variation_7d"),
    ("30 dias", "variation_30d"),
];

pub fn format_currency(value: f64, currency: &str) -> String {
    let formatted_number = format_with_commas(value);

    match currency {
        "BRL" => format!("R$ {formatted_number}"),
        "USD" | "CAD" | "AUD" => format!("${formatted_number}"),
        "EUR" => format!("{formatted_number} €"),
        "GBP" => format!("£{formatted_number}"),
        _ => format!("{formatted_number} {currency}"),
    }
}

fn format_with_commas(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let formatted_integer = integer_part
        .chars()
        .rev()
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
        .chars()
        .rev()
        .collect::<String>();

    // "-0.00" reads badly
    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{formatted_integer}.{decimal_part}")
}

pub fn format_pct(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    format!("{value:.2}%")
}

/// ISO `YYYY-MM-DD` dates are shown day first; anything else passes through.
pub fn format_date(text: &str) -> String {
    if text.len() != 10 {
        return text.to_string();
    }
    match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        Ok(date) => date.format("%d/%m/%Y").to_string(),
        Err(_) => text.to_string(),
    }
}

/// Rate type plus its percentages, e.g. `FIXO+IPCA (6.00% + 4.50%)`.
pub fn rate_label(item: &Record) -> String {
    let rate_type = item.text("rate_type").trim().to_uppercase();
    let fixed = item.number("rate_fixed");
    let ipca = item.number("rate_ipca");
    let cdi = item.number("rate_cdi");
    let annual = item.number("annual_rate");
    let or_annual = |rate: f64| if rate != 0.0 { rate } else { annual };

    match rate_type.as_str() {
        "FIXO" => format!("{rate_type} ({})", format_pct(or_annual(fixed))),
        "IPCA" => format!("{rate_type} ({})", format_pct(or_annual(ipca))),
        "CDI" => format!("{rate_type} ({})", format_pct(or_annual(cdi))),
        "FIXO+IPCA" => format!("{rate_type} ({} + {})", format_pct(fixed), format_pct(ipca)),
        "FIXO+CDI" => format!("{rate_type} ({} + {})", format_pct(fixed), format_pct(cdi)),
        "" => format!("N/A ({})", format_pct(annual)),
        _ => format!("{rate_type} ({})", format_pct(annual)),
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(160);
    table
}

fn bold(text: impl Into<String>) -> Cell {
    Cell::new(text.into()).add_attribute(Attribute::Bold)
}

fn right(text: impl Into<String>) -> Cell {
    Cell::new(text.into()).set_alignment(CellAlignment::Right)
}

fn signed(text: impl Into<String>, value: f64) -> Cell {
    let c = if value >= 0.0 { TColor::Green } else { TColor::Red };
    right(text).fg(c)
}

fn sortable_header(columns: &[(&str, &str)], spec: &SortSpec) -> Vec<Cell> {
    columns
        .iter()
        .map(|(label, field)| bold(spec.label(label, field)))
        .collect()
}

pub fn portfolios_table(universe: &[Portfolio], selection: &SelectionState) -> Table {
    let mut table = new_table();
    table.set_header(vec![bold(""), bold("Id"), bold("Carteira")]);

    for portfolio in universe {
        let mark = if selection.is_active(portfolio.id) { "[x]" } else { "[ ]" };
        table.add_row(vec![
            Cell::new(mark),
            right(portfolio.id.to_string()),
            Cell::new(&portfolio.name),
        ]);
    }
    if universe.is_empty() {
        table.add_row(vec![Cell::new(""), Cell::new(""), Cell::new("Nenhuma carteira cadastrada.")]);
    }
    table
}

pub fn annual_table(pivot: &AnnualPivot, selection: &CategorySelection, currency: &str) -> Table {
    let mut table = new_table();

    let mut header = vec![bold("")];
    for year in &pivot.years {
        let mut text = year.label();
        for metric in Metric::ALL.into_iter().filter(|m| selection.shows(*m)) {
            text.push_str(&format!(
                "\n{}: {}",
                metric.description(),
                format_currency(year.total(metric), currency)
            ));
        }
        header.push(bold(text));
    }
    table.set_header(header);

    for (month_idx, month) in pivot.months.iter().enumerate() {
        let mut row = vec![bold(*month)];
        for year in &pivot.years {
            let lines: Vec<String> = Metric::ALL
                .into_iter()
                .filter(|m| selection.shows(*m))
                .map(|m| {
                    format!(
                        "{}: {}",
                        m.description(),
                        format_currency(year.values(m)[month_idx], currency)
                    )
                })
                .collect();
            row.push(right(lines.join("\n")));
        }
        table.add_row(row);
    }

    if pivot.years.is_empty() {
        table.add_row(vec![Cell::new(""), Cell::new("Sem dados para tabela anual.")]);
    }
    table
}

pub fn monthly_summary_table(rows: &[MonthlyClassRow], currency: &str) -> Table {
    let mut table = new_table();

    let mut header = vec![bold("data")];
    for category in Category::ALL {
        header.push(bold(format!("{} investidos", category.description())));
        header.push(bold(format!("{} proventos", category.description())));
    }
    header.push(bold("TOTAL investidos"));
    header.push(bold("TOTAL proventos"));
    table.set_header(header);

    for row in rows {
        let mut cells = vec![Cell::new(row.label())];
        for category in Category::ALL {
            for metric in Metric::ALL {
                cells.push(right(format_currency(row.value(category, metric), currency)));
            }
        }
        cells.push(right(format_currency(row.field("total_invested"), currency)).add_attribute(Attribute::Bold));
        cells.push(right(format_currency(row.field("total_incomes"), currency)).add_attribute(Attribute::Bold));
        table.add_row(cells);
    }

    if rows.is_empty() {
        table.add_row(vec![Cell::new(""), Cell::new("Sem dados mensais para o periodo selecionado.")]);
    }
    table
}

/// Key figures as a single horizontal row.
pub fn cards_table(cards: &[(&str, f64)], currency: &str) -> Table {
    let mut table = new_table();
    table.set_header(cards.iter().map(|(label, _)| bold(*label)).collect::<Vec<_>>());
    table.add_row(
        cards
            .iter()
            .map(|(_, value)| right(format_currency(*value, currency)))
            .collect::<Vec<_>>(),
    );
    table
}

/// One line per group: the figures shown on a collapsed accordion header.
pub fn groups_table(groups: &[(&str, GroupSummary)], currency: &str) -> Table {
    let mut table = new_table();
    table.set_header(vec![
        bold("Grupo"),
        bold("Registros"),
        bold("Aplicado"),
        bold("Valor atual"),
        bold("Rendimento"),
        bold("Total recebido"),
        bold("% na carteira"),
    ]);

    for (label, summary) in groups {
        table.add_row(vec![
            Cell::new(*label),
            right(summary.count.to_string()),
            right(format_currency(summary.applied, currency)),
            right(format_currency(summary.current, currency)),
            signed(format_currency(summary.income, currency), summary.income),
            right(format_currency(summary.total_received, currency)),
            right(format_pct(summary.weight)),
        ]);
    }
    table
}

pub fn fixed_income_table(items: &[Record], spec: &SortSpec, currency: &str) -> Table {
    let mut table = new_table();
    table.set_header(sortable_header(&FIXED_INCOME_COLUMNS, spec));

    for item in items {
        // older records only carry the original contribution
        let applied = if item.has("active_applied_value") {
            item.number("active_applied_value")
        } else {
            item.number("aporte")
        };
        table.add_row(vec![
            Cell::new(item.text("distributor")),
            Cell::new(item.text("issuer")),
            Cell::new(item.text("investment_type")),
            Cell::new(rate_label(item)),
            Cell::new(format_date(&item.text("date_aporte"))),
            right(format_currency(applied, currency)),
            Cell::new(format_date(&item.text("maturity_date"))),
            right(format_currency(item.number("current_gross_value"), currency)),
        ]);
    }

    if items.is_empty() {
        table.add_row(vec![Cell::new("Sem registros nesse grupo.")]);
    }
    table
}

pub fn positions_table(items: &[Record], spec: &SortSpec, currency: &str) -> Table {
    let mut table = new_table();
    table.set_header(sortable_header(&POSITION_COLUMNS, spec));

    for item in items {
        let pnl = item.number("open_pnl_value");
        table.add_row(vec![
            Cell::new(item.text("ticker")),
            Cell::new(item.text("name")),
            right(format!("{:.4}", item.number("shares"))),
            right(format_currency(item.number("price"), currency)),
            right(format_currency(item.number("avg_price"), currency)),
            right(format_currency(item.number("invested_value"), currency)),
            right(format_currency(item.number("value"), currency)),
            right(format_currency(item.number("total_incomes"), currency)),
            signed(
                format!(
                    "{} ({})",
                    format_currency(pnl, currency),
                    format_pct(item.number("open_pnl_pct"))
                ),
                pnl,
            ),
            right(format_pct(item.number("weight"))),
        ]);
    }
    table
}

pub fn assets_table(
    items: &[Record],
    incomes_by_ticker: &HashMap<String, f64>,
    spec: &SortSpec,
    currency: &str,
) -> Table {
    let mut table = new_table();
    table.set_header(sortable_header(&ASSET_COLUMNS, spec));

    for item in items {
        let ticker = item.text("ticker");
        let incomes = incomes_by_ticker
            .get(&ticker.to_uppercase())
            .copied()
            .unwrap_or(0.0);
        let day = item.number("variation_day");
        let week = item.number("variation_7d");
        let month = item.number("variation_30d");

        table.add_row(vec![
            Cell::new(&ticker),
            Cell::new(item.text("name")),
            Cell::new(item.text("sector")),
            right(format_currency(item.number("price"), currency)),
            right(format_pct(item.number("dy"))),
            right(format!("{:.2}", item.number("pl"))),
            right(format!("{:.2}", item.number("pvp"))),
            right(format_currency(incomes, currency)),
            signed(format_pct(day), day),
            signed(format_pct(week), week),
            signed(format_pct(month), month),
        ]);
    }

    if items.is_empty() {
        table.add_row(vec![Cell::new("Nenhum ativo cadastrado ainda.")]);
    }
    table
}

/// Highest dividend yield, best day and largest market cap, plus the income
/// total of the selected portfolios. `None` when there are no assets.
pub fn highlights_table(items: &[Record], incomes_total: f64, currency: &str) -> Option<Table> {
    let highest_dy = leader(items, "dy")?;
    let highest_gain = leader(items, "variation_day")?;
    let largest_cap = leader(items, "market_cap_bi")?;

    let mut table = new_table();
    table.set_header(vec![
        bold("Maior dividend yield"),
        bold("Maior alta do dia"),
        bold("Maior valor de mercado"),
        bold("Proventos totais"),
    ]);
    table.add_row(vec![
        Cell::new(format!(
            "{}\n{} a.a.",
            highest_dy.text("ticker"),
            format_pct(highest_dy.number("dy"))
        )),
        Cell::new(format!(
            "{}\n{}",
            highest_gain.text("ticker"),
            format_pct(highest_gain.number("variation_day"))
        )),
        Cell::new(format!(
            "{}\n{:.2} bi",
            largest_cap.text("ticker"),
            largest_cap.number("market_cap_bi")
        )),
        right(format_currency(incomes_total, currency)),
    ]);
    Some(table)
}
