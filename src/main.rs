use std::collections::HashMap;
use std::path::PathBuf;

use crate::api::{load_payload, DashboardPayload, FixedIncomePayload, LatestResponse, SnapshotPayload};
use crate::error::{ApiError, ValidationError};
use crate::grouping::{
    group_by, income_totals_by_ticker, summarize_groups, AssetClass, RateGroup, FIXED_INCOME_FIELDS,
    POSITION_FIELDS,
};
use crate::pivot::{build_annual_pivot, CategorySelection};
use crate::selection::{Portfolio, PortfolioId, SelectionState};
use crate::sort::{
    asset_sorter, fixed_income_sorter, position_sorter, SortSpec, DEFAULT_ASSET_SORT,
    DEFAULT_FIXED_INCOME_SORT, DEFAULT_POSITION_SORT,
};
use crate::value::Record;

use clap::{arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use eyre::WrapErr;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod grouping;
mod pivot;
mod report;
mod selection;
mod sort;
mod value;

const PORTFOLIOS_FILE: &str = "portfolios.json";
const DASHBOARD_FILE: &str = "dashboard.json";
const FIXED_INCOMES_FILE: &str = "fixed_incomes.json";
const SNAPSHOT_FILE: &str = "snapshot.json";
const ASSETS_FILE: &str = "assets.json";
const INCOMES_FILE: &str = "incomes.json";

const NO_PORTFOLIO: &str = "No portfolio";

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    data_dir: String,
    currency: String,
    #[serde(default)]
    selected_portfolio_ids: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            currency: "BRL".to_string(),
            selected_portfolio_ids: Vec::new(),
        }
    }
}

fn sort_args(command: Command) -> Command {
    command
        .arg(
            arg!(--sort <FIELD> "Click the header of FIELD (repeat to click again)")
                .required(false)
                .action(ArgAction::Append),
        )
        .arg(arg!(--order <DIR> "Force the final direction: asc or desc").required(false))
}

fn cli() -> Command {
    Command::new("carteira_rs")
        .about("Investment portfolio dashboard for the terminal")
        .arg_required_else_help(true)
        .arg(
            arg!(--"data-dir" <DIR> "Directory holding the API payload files")
                .required(false)
                .global(true),
        )
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(
            Command::new("portfolios")
                .about("List portfolios and toggle which ones are active")
                .arg(
                    arg!(--toggle <ID> "Toggle the portfolio with this id (repeatable)")
                        .required(false)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("annual")
                .about("Show invested amounts and incomes per month and year")
                .arg(
                    arg!(--"toggle-category" <KEY> "Toggle a category: br, us, fii, cripto, fixa")
                        .required(false)
                        .action(ArgAction::Append),
                )
                .arg(
                    arg!(--"toggle-metric" <KEY> "Toggle a metric: invested, incomes")
                        .required(false)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(sort_args(
            Command::new("fixed-income").about("Show fixed-income titles grouped by rate type"),
        ))
        .subcommand(sort_args(
            Command::new("positions").about("Show variable-income positions grouped by asset class"),
        ))
        .subcommand(sort_args(
            Command::new("assets").about("Show registered assets with their incomes and highlights"),
        ))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "carteira_rs=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn values<'a>(matches: &'a ArgMatches, id: &str) -> impl Iterator<Item = &'a String> + 'a {
    matches.get_many::<String>(id).into_iter().flatten()
}

fn payload_path(cfg: &Config, matches: &ArgMatches, file: &str) -> PathBuf {
    let dir = matches
        .get_one::<String>("data-dir")
        .unwrap_or(&cfg.data_dir);
    PathBuf::from(dir).join(file)
}

/// Replay the `--sort` clicks on top of the view's default ordering.
fn sort_spec(default_field: &str, matches: &ArgMatches) -> Result<SortSpec, ValidationError> {
    let mut spec = values(matches, "sort").fold(SortSpec::new(default_field), |spec, field| {
        spec.toggle(field)
    });
    if let Some(order) = matches.get_one::<String>("order") {
        spec.direction = order.parse()?;
    }
    Ok(spec)
}

fn category_selection(matches: &ArgMatches) -> Result<CategorySelection, ValidationError> {
    let mut selection = CategorySelection::default();
    for key in values(matches, "toggle-category") {
        selection = selection.toggle_category(key.parse()?);
    }
    for key in values(matches, "toggle-metric") {
        selection = selection.toggle_metric(key.parse()?);
    }
    Ok(selection)
}

/// Load one payload through the latest-response loader.
///
/// Every call gets its own loader: a command issues each request once, so
/// nothing is ever superseded here.
async fn fetch<T>(path: PathBuf) -> Result<T, ApiError>
where
    T: DeserializeOwned + Send + 'static,
{
    let mut loader = LatestResponse::new();
    loader.spawn(async move { load_payload(&path).await });
    loader.latest().await
}

/// Like [`fetch`], but a failure reported by the server is printed for the
/// user and yields `None` instead of an error.
async fn fetch_or_report<T>(path: PathBuf) -> eyre::Result<Option<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    match fetch(path.clone()).await {
        Ok(payload) => Ok(Some(payload)),
        Err(ApiError::Upstream(message)) => {
            eprintln!("{}", message.red());
            Ok(None)
        }
        Err(err) => Err(eyre::Report::new(err).wrap_err(format!("could not load {}", path.display()))),
    }
}

async fn load_selection(cfg: &Config, matches: &ArgMatches) -> Option<(Vec<Portfolio>, SelectionState)> {
    match fetch::<Vec<Portfolio>>(payload_path(cfg, matches, PORTFOLIOS_FILE)).await {
        Ok(universe) => {
            let selection = SelectionState::from_stored(&cfg.selected_portfolio_ids).reconcile(&universe);
            Some((universe, selection))
        }
        Err(err) => {
            tracing::debug!("portfolio list unavailable: {err}");
            None
        }
    }
}

async fn print_headline(cfg: &Config, matches: &ArgMatches) {
    if let Some((universe, selection)) = load_selection(cfg, matches).await {
        println!(
            "{} {}",
            "Carteira:".bold(),
            selection.active_name(&universe).unwrap_or(NO_PORTFOLIO)
        );
    }
}

/// The stored selection reconciled against `universe`, then each toggle
/// applied in order. Ids missing from the universe are skipped.
fn apply_toggles<'a>(
    cfg: &Config,
    universe: &[Portfolio],
    toggles: impl IntoIterator<Item = &'a String>,
) -> Result<SelectionState, ValidationError> {
    let mut selection = SelectionState::from_stored(&cfg.selected_portfolio_ids).reconcile(universe);
    for text in toggles {
        let id = PortfolioId::parse(text)?;
        if !universe.iter().any(|p| p.id == id) {
            tracing::warn!(%id, "no portfolio with this id");
            continue;
        }
        selection = selection.toggle(id);
    }
    Ok(selection)
}

async fn portfolios(cfg: &mut Config, matches: &ArgMatches) -> eyre::Result<()> {
    let Some(universe) =
        fetch_or_report::<Vec<Portfolio>>(payload_path(cfg, matches, PORTFOLIOS_FILE)).await?
    else {
        return Ok(());
    };

    let selection = apply_toggles(cfg, &universe, values(matches, "toggle"))?;

    println!("{}", report::portfolios_table(&universe, &selection));
    println!(
        "{} {}",
        "Carteira:".bold(),
        selection.active_name(&universe).unwrap_or(NO_PORTFOLIO)
    );

    cfg.selected_portfolio_ids = selection.to_stored();
    confy::store("carteira", "config", &*cfg).wrap_err("could not store the portfolio selection")?;
    Ok(())
}

async fn annual(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let selection = category_selection(matches)?;
    print_headline(cfg, matches).await;

    let Some(dashboard) =
        fetch_or_report::<DashboardPayload>(payload_path(cfg, matches, DASHBOARD_FILE)).await?
    else {
        return Ok(());
    };

    let pivot = build_annual_pivot(&dashboard.monthly_class_summary, selection.categories());
    let shown: Vec<&str> = selection.categories().iter().map(|c| c.description()).collect();
    println!("{} {}", "Tabela anual:".bold(), shown.join(", "));
    println!("{}", report::annual_table(&pivot, &selection, &cfg.currency));

    println!("{}", "Resumo mensal por classe".bold());
    println!(
        "{}",
        report::monthly_summary_table(&dashboard.monthly_class_summary, &cfg.currency)
    );
    Ok(())
}

async fn fixed_income(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let spec = sort_spec(DEFAULT_FIXED_INCOME_SORT, matches)?;
    print_headline(cfg, matches).await;

    let Some(payload) =
        fetch_or_report::<FixedIncomePayload>(payload_path(cfg, matches, FIXED_INCOMES_FILE)).await?
    else {
        return Ok(());
    };

    let summary = &payload.summary;
    println!(
        "{}",
        report::cards_table(
            &[
                ("Total aplicado", summary.number("applied_total")),
                ("Valor atual bruto", summary.number("current_total")),
                ("Rendimento bruto", summary.number("income_total")),
                ("Total recebido", summary.number("total_received")),
            ],
            &cfg.currency,
        )
    );

    let groups = group_by(&payload.items, |item| Some(RateGroup::classify(item)));
    let summaries = summarize_groups(
        &groups,
        &RateGroup::ALL,
        &FIXED_INCOME_FIELDS,
        summary.number("current_total"),
    );
    let rows: Vec<(&str, _)> = summaries.iter().map(|(g, s)| (g.description(), *s)).collect();
    println!("{}", report::groups_table(&rows, &cfg.currency));

    let sorter = fixed_income_sorter();
    for group in RateGroup::ALL {
        let items = groups.get(&group).map(Vec::as_slice).unwrap_or(&[]);
        println!("{}", group.description().bold());
        println!(
            "{}",
            report::fixed_income_table(&sorter.sort(items, &spec), &spec, &cfg.currency)
        );
    }
    Ok(())
}

async fn positions(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let spec = sort_spec(DEFAULT_POSITION_SORT, matches)?;
    print_headline(cfg, matches).await;

    let Some(snapshot) =
        fetch_or_report::<SnapshotPayload>(payload_path(cfg, matches, SNAPSHOT_FILE)).await?
    else {
        return Ok(());
    };

    let totals = &snapshot.totals;
    println!(
        "{}",
        report::cards_table(
            &[
                ("Patrimonio", totals.number("total_value")),
                ("Investido", totals.number("invested_value")),
                ("Aberto (R$)", totals.number("open_pnl_value")),
                ("Proventos 12 meses", totals.number("incomes_12m")),
                ("Proventos total", totals.number("total_incomes")),
            ],
            &cfg.currency,
        )
    );

    let groups = group_by(&snapshot.positions(), AssetClass::classify);
    let summaries = summarize_groups(
        &groups,
        &AssetClass::ALL,
        &POSITION_FIELDS,
        totals.number("total_value"),
    );
    let rows: Vec<(&str, _)> = summaries.iter().map(|(c, s)| (c.description(), *s)).collect();
    println!("{}", report::groups_table(&rows, &cfg.currency));

    let sorter = position_sorter();
    for (class, items) in &groups {
        println!("{}", class.description().bold());
        println!(
            "{}",
            report::positions_table(&sorter.sort(items, &spec), &spec, &cfg.currency)
        );
    }
    Ok(())
}

async fn assets(cfg: &Config, matches: &ArgMatches) -> eyre::Result<()> {
    let spec = sort_spec(DEFAULT_ASSET_SORT, matches)?;

    let (_, assets, incomes) = futures::join!(
        print_headline(cfg, matches),
        fetch_or_report::<Vec<Record>>(payload_path(cfg, matches, ASSETS_FILE)),
        fetch::<Vec<Record>>(payload_path(cfg, matches, INCOMES_FILE))
    );
    let Some(assets) = assets? else {
        return Ok(());
    };

    let incomes_by_ticker: HashMap<String, f64> = match incomes {
        Ok(incomes) => income_totals_by_ticker(&incomes),
        Err(err) => {
            tracing::warn!("incomes unavailable, showing assets without them: {err}");
            HashMap::new()
        }
    };

    let sorted = asset_sorter(&incomes_by_ticker).sort(&assets, &spec);
    if let Some(highlights) =
        report::highlights_table(&assets, incomes_by_ticker.values().sum(), &cfg.currency)
    {
        println!("{highlights}");
    }
    println!(
        "{}",
        report::assets_table(&sorted, &incomes_by_ticker, &spec, &cfg.currency)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_tracing();

    let mut cfg: Config = confy::load("carteira", "config").wrap_err("could not load the config file")?;
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("config", _)) => {
            let path = confy::get_configuration_file_path("carteira", "config")?;
            println!("Your config file is located here: \n{}", path.display());
        }
        Some(("portfolios", sub)) => portfolios(&mut cfg, sub).await?,
        Some(("annual", sub)) => annual(&cfg, sub).await?,
        Some(("fixed-income", sub)) => fixed_income(&cfg, sub).await?,
        Some(("positions", sub)) => positions(&cfg, sub).await?,
        Some(("assets", sub)) => assets(&cfg, sub).await?,
        _ => cli().print_help()?,
    }
    Ok(())
}
