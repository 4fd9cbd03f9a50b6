use std::{fs::File, path::Path, sync::Arc};

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use epidyn::{
    config::Config,
    dates::{DateRange, DefaultDates},
    formatters::{
        CSVFormatter, GeoJSONFormatter, GeoJSONSeqFormatter, OutputFormatter, OutputGenerator,
    },
    frames::{comparison_to_dataframe, ranking_to_dataframe, summaries_to_dataframe},
    loader::Dataset,
    metric::{Metric, SourceFormat},
    Epidyn, COL,
};
use log::{debug, info};
use nonempty::NonEmpty;
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::{Display, EnumString};

use crate::{
    display::{
        display_comparison, display_map_frame, display_ranking, display_regions, display_summary,
    },
    error::{EpidynCliError, EpidynCliResult},
};

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOADING_STRING: &str = "Downloading observations";

/// Defines the output formats we are able to produce data in.
#[derive(Clone, Debug, Default, Deserialize, Serialize, EnumString, Display, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    GeoJSON,
    GeoJSONSeq,
}

impl OutputFormat {
    /// Formatter for output without geometry. `None` means display as a table.
    fn tabular(&self) -> EpidynCliResult<Option<OutputFormatter>> {
        match self {
            OutputFormat::Table => Ok(None),
            OutputFormat::Csv => Ok(Some(OutputFormatter::Csv(CSVFormatter))),
            other => Err(EpidynCliError::UnsupportedOutput(other.to_string())),
        }
    }
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: Option<U>,
) -> EpidynCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, &mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, &mut data)?;
    };
    Ok(())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> EpidynCliResult<()>;
}

/// Options shared by every subcommand, set globally on the command line.
#[derive(Args, Debug, Clone)]
struct SessionArgs {
    #[arg(from_global)]
    quiet: bool,
    #[arg(from_global)]
    metric: Metric,
    #[arg(from_global)]
    today: Option<NaiveDate>,
    #[arg(from_global)]
    no_cache: bool,
}

impl SessionArgs {
    fn default_dates(&self) -> DefaultDates {
        DefaultDates::new(self.today.unwrap_or_else(|| Local::now().date_naive()))
    }

    fn spinner(&self, message: &str) -> Option<Spinner> {
        (!self.quiet).then(|| {
            Spinner::with_timer(
                DEFAULT_PROGRESS_SPINNER,
                message.to_string() + RUNNING_TAIL_STRING,
            )
        })
    }

    /// Loads the dataset for `config`, keeping raw downloads in the user cache directory unless
    /// caching is disabled.
    async fn load(&self, config: Config) -> EpidynCliResult<(Epidyn, Arc<Dataset>)> {
        let sp = self.spinner(LOADING_STRING);
        let mut epidyn = Epidyn::new_with_config(config);
        if !self.no_cache {
            if let Some(cache_dir) = dirs::cache_dir() {
                epidyn = epidyn.with_disk_cache(cache_dir.join("epidyn"));
            }
        }
        let dataset = epidyn.dataset().await;
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }
        let dataset = dataset?;
        if let Some((first, last)) = dataset.date_bounds() {
            info!("Observations run from {first} to {last}");
        }
        Ok((epidyn, dataset))
    }
}

#[derive(Args, Debug, Clone)]
struct OutputArgs {
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv",
        default_value = "table",
        help = "Output format for the results"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
}

impl OutputArgs {
    /// Displays as a table, or writes the frame built by `to_df` with the chosen formatter.
    fn emit<D, F>(&self, display: D, to_df: F) -> EpidynCliResult<()>
    where
        D: FnOnce() -> anyhow::Result<()>,
        F: FnOnce() -> EpidynCliResult<DataFrame>,
    {
        match self.output_format.tabular()? {
            None => display()?,
            Some(formatter) => write_output(formatter, to_df()?, self.output_file.as_deref())?,
        }
        Ok(())
    }
}

/// The `regions` command lists the regions in the dataset with their geographic codes.
#[derive(Args, Debug)]
pub struct RegionsCommand {
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    session: SessionArgs,
}

impl RunCommand for RegionsCommand {
    async fn run(&self, config: Config) -> EpidynCliResult<()> {
        info!("Running `regions` subcommand");
        self.output.output_format.tabular()?;
        let (_, dataset) = self.session.load(config).await?;
        self.output.emit(
            || display_regions(&dataset.regions, &dataset.region_codes),
            || {
                let codes = dataset
                    .regions
                    .iter()
                    .map(|region| dataset.region_codes.get(region))
                    .collect::<Vec<_>>();
                Ok(DataFrame::new(vec![
                    Series::new(COL::REGION, dataset.regions.clone()),
                    Series::new(COL::CODE, codes),
                ])?)
            },
        )
    }
}

/// The `summary` command shows one region at a glance: its latest total and the average new
/// per day and acceleration over a window.
#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[arg(index = 1, help = "Region name, for example 'New York'")]
    region: String,
    #[arg(
        short = 'w',
        long,
        value_name = "START...END",
        help = "Window to summarise. Defaults to the week ending two days ago."
    )]
    window: Option<DateRange>,
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    session: SessionArgs,
}

impl RunCommand for SummaryCommand {
    async fn run(&self, config: Config) -> EpidynCliResult<()> {
        info!("Running `summary` subcommand");
        self.output.output_format.tabular()?;
        let window = self
            .window
            .unwrap_or_else(|| self.session.default_dates().window());
        let (epidyn, dataset) = self.session.load(config).await?;
        let table = dataset.table(self.session.metric)?;
        let summary = epidyn.dynamics().summary(table, &self.region, &window)?;
        debug!("{summary:?}");
        self.output.emit(
            || display_summary(&summary, self.session.metric),
            || Ok(summaries_to_dataframe(std::slice::from_ref(&summary))?),
        )
    }
}

/// The `ranking` command orders regions by their mean acceleration over a date range.
#[derive(Args, Debug)]
pub struct RankingCommand {
    #[arg(
        short = 'r',
        long,
        value_name = "START...END",
        help = "Dates to average over. Defaults to the week ending two days ago."
    )]
    range: Option<DateRange>,
    #[arg(
        long,
        conflicts_with = "range",
        help = "Average over the month ending two days ago instead of the week"
    )]
    last_month: bool,
    #[arg(short = 'n', long, help = "Only show the top N regions")]
    top: Option<usize>,
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    session: SessionArgs,
}

impl RankingCommand {
    fn range(&self) -> DateRange {
        let defaults = self.session.default_dates();
        match self.range {
            Some(range) => range,
            None if self.last_month => defaults.last_month(),
            None => defaults.window(),
        }
    }
}

impl RunCommand for RankingCommand {
    async fn run(&self, config: Config) -> EpidynCliResult<()> {
        info!("Running `ranking` subcommand");
        self.output.output_format.tabular()?;
        let range = self.range();
        let (epidyn, dataset) = self.session.load(config).await?;
        let table = dataset.table(self.session.metric)?;
        let mut ranking = epidyn.dynamics().ranking(table, &range);
        if let Some(top) = self.top {
            ranking.truncate(top);
        }
        self.output.emit(
            || display_ranking(&ranking, self.session.metric, &range),
            || Ok(ranking_to_dataframe(&ranking)?),
        )
    }
}

/// The `map` command produces the smoothed acceleration of every region on one date, ready to
/// be drawn as a choropleth.
#[derive(Args, Debug)]
pub struct MapCommand {
    #[arg(
        short = 'd',
        long,
        value_name = "YYYY-MM-DD",
        help = "Date to map. Defaults to two days ago."
    )]
    date: Option<NaiveDate>,
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|geojson|geojsonseq",
        default_value = "table",
        help = "Output format for the results"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(
        short = 'b',
        long,
        value_name = "PATH|URL",
        help = "\
            GeoJSON boundary file with one feature per region, keyed by region code. Needed for\n\
            geojson and geojsonseq output. No boundary file ships with epidyn, so either pass one\n\
            here or set `boundaries` in the config file."
    )]
    boundaries: Option<String>,
    #[command(flatten)]
    session: SessionArgs,
}

impl RunCommand for MapCommand {
    async fn run(&self, mut config: Config) -> EpidynCliResult<()> {
        info!("Running `map` subcommand");
        if let Some(boundaries) = &self.boundaries {
            config.boundaries = boundaries.clone();
        }
        let date = self
            .date
            .unwrap_or_else(|| self.session.default_dates().ending());
        let (epidyn, dataset) = self.session.load(config).await?;
        let table = dataset.table(self.session.metric)?;
        let frame =
            epidyn
                .dynamics()
                .map_frame(table, self.session.metric, date, &dataset.region_codes);
        if !frame.unmapped.is_empty() {
            info!(
                "Regions without a code are not mapped: {}",
                frame.unmapped.join(", ")
            );
        }
        let formatter = match self.output_format {
            OutputFormat::Table => return Ok(display_map_frame(&frame)?),
            OutputFormat::Csv => OutputFormatter::Csv(CSVFormatter),
            OutputFormat::GeoJSON => OutputFormatter::GeoJSON(GeoJSONFormatter {
                boundaries: epidyn.boundaries().await?,
                metadata: Some(frame.metadata()),
            }),
            OutputFormat::GeoJSONSeq => OutputFormatter::GeoJSONSeq(GeoJSONSeqFormatter {
                boundaries: epidyn.boundaries().await?,
            }),
        };
        write_output(formatter, frame.to_dataframe()?, self.output_file.as_deref())
    }
}

/// The `compare` command follows several regions side by side, day by day.
#[derive(Args, Debug)]
pub struct CompareCommand {
    #[arg(index = 1, required = true, num_args = 1.., help = "Region names to compare")]
    regions: Vec<String>,
    #[arg(
        short = 'r',
        long,
        value_name = "START...END",
        help = "Dates to compare over. Defaults to the 240 days ending two days ago."
    )]
    range: Option<DateRange>,
    #[command(flatten)]
    output: OutputArgs,
    #[command(flatten)]
    session: SessionArgs,
}

impl RunCommand for CompareCommand {
    async fn run(&self, config: Config) -> EpidynCliResult<()> {
        info!("Running `compare` subcommand");
        self.output.output_format.tabular()?;
        let regions = NonEmpty::from_vec(self.regions.clone())
            .context("At least one region is needed to compare")?;
        let range = self
            .range
            .unwrap_or_else(|| self.session.default_dates().lookback());
        let (epidyn, dataset) = self.session.load(config).await?;
        let table = dataset.table(self.session.metric)?;
        let rows = epidyn.dynamics().compare(table, &regions, &range)?;
        self.output.emit(
            || display_comparison(&rows),
            || Ok(comparison_to_dataframe(&rows)?),
        )
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Epidyn follows how fast an epidemic is speeding up or slowing down in each region.", long_about = None, name="epidyn")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        short = 'm',
        long,
        default_value = "cases",
        help = "Metric to follow, for example cases, deaths or cases_avg_per_100k",
        global = true
    )]
    metric: Metric,
    #[arg(
        long,
        value_name = "YYYY-MM-DD",
        help = "Date that default ranges are relative to. Defaults to the current date.",
        global = true
    )]
    today: Option<NaiveDate>,
    #[arg(
        long = "no-cache",
        help = "Always download the observations instead of using the cached copy",
        global = true
    )]
    no_cache: bool,
    #[arg(
        long,
        help = "URL or path of the observations CSV, overriding the config file",
        global = true
    )]
    dataset: Option<String>,
    #[arg(
        long,
        value_name = "counties|rolling-averages",
        help = "Layout of the observations CSV, overriding the config file",
        global = true
    )]
    source_format: Option<SourceFormat>,
}

impl Cli {
    /// Applies command line overrides on top of the config file.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.clone();
        }
        if let Some(source_format) = self.source_format {
            config.source_format = source_format;
        }
    }
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// List regions in the dataset and their geographic codes
    Regions(RegionsCommand),
    /// Latest total, average new per day and average acceleration for one region
    Summary(SummaryCommand),
    /// Rank regions by mean acceleration over a range of dates
    Ranking(RankingCommand),
    /// Smoothed acceleration per region on one date, optionally as GeoJSON (needs a boundary
    /// file, see `--boundaries`)
    Map(MapCommand),
    /// Compare regions day by day
    Compare(CompareCommand),
}
