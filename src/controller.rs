use std::path::PathBuf;
use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{self, KeyCode, KeyEvent};

use crate::cleaning::{ConvertTarget, ImputeMethod, ReindexAction};
use crate::domain::{ScrubConfig, ScrubError};
use crate::filter::{ColumnPredicate, FilterSpec};
use crate::inputter::{CommandLine, CommandOutcome};
use crate::session::{Event, InspectAction};
use crate::viz::{ChartKind, ChartRequest};

pub struct Controller {
    event_poll_time: u64,
    command_line: CommandLine,
    command_mode: bool,
}

impl Controller {
    pub fn new(cfg: &ScrubConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
            command_line: CommandLine::default(),
            command_mode: false,
        }
    }

    /// Prompt contents while command mode is active, for the UI to render.
    pub fn prompt(&self) -> Option<(&str, usize)> {
        self.command_mode
            .then(|| (self.command_line.text(), self.command_line.cursor()))
    }

    pub fn handle_event(&mut self) -> Result<Option<Event>, ScrubError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let event::Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(self.handle_key(key));
        }
        Ok(None)
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<Event> {
        if self.command_mode {
            return match self.command_line.read(key) {
                CommandOutcome::Pending => None,
                CommandOutcome::Canceled => {
                    self.command_mode = false;
                    None
                }
                CommandOutcome::Submitted(line) => {
                    self.command_mode = false;
                    if line.trim().is_empty() {
                        None
                    } else {
                        Some(parse_command(&line).unwrap_or_else(Event::CommandError))
                    }
                }
            };
        }
        let message = match key.code {
            KeyCode::Char('q') => Some(Event::Quit),
            KeyCode::Char('?') => Some(Event::Help),
            KeyCode::Char('h') => Some(Event::Inspect(InspectAction::Head)),
            KeyCode::Char('t') => Some(Event::Inspect(InspectAction::Tail)),
            KeyCode::Char('s') => Some(Event::Inspect(InspectAction::Shape)),
            KeyCode::Char('d') => Some(Event::Inspect(InspectAction::Describe)),
            KeyCode::Char('i') => Some(Event::Inspect(InspectAction::Info)),
            KeyCode::Char('m') => Some(Event::Inspect(InspectAction::Missing)),
            KeyCode::Char('v') => Some(Event::Inspect(InspectAction::View)),
            KeyCode::Char('f') => Some(Event::ToggleFilter),
            KeyCode::Char('c') => Some(Event::ShowCleaning),
            KeyCode::Char(':') => {
                self.command_line.clear();
                self.command_mode = true;
                None
            }
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

fn expand_path(raw: &str) -> Result<PathBuf, String> {
    shellexpand::full(raw)
        .map(|p| PathBuf::from(p.into_owned()))
        .map_err(|e| format!("bad path \"{raw}\": {e}"))
}

fn parse_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_f64(raw: &str, what: &str) -> Result<f64, String> {
    raw.parse()
        .map_err(|_| format!("{what} must be a number, got \"{raw}\""))
}

fn parse_impute(method: &str, rest: &[&str]) -> Result<ImputeMethod, String> {
    match method.to_lowercase().as_str() {
        "mean" => Ok(ImputeMethod::Mean),
        "median" => Ok(ImputeMethod::Median),
        "mode" => Ok(ImputeMethod::Mode),
        "const" => match rest.first() {
            Some(value) => Ok(ImputeMethod::Constant((*value).to_string())),
            None => Err("usage: impute COL const VALUE".to_string()),
        },
        other => Err(format!("unknown impute method \"{other}\"")),
    }
}

fn parse_convert(target: &str) -> Result<ConvertTarget, String> {
    match target.to_lowercase().as_str() {
        "int" | "integer" => Ok(ConvertTarget::Integer),
        "float" => Ok(ConvertTarget::Float),
        "str" | "string" | "text" => Ok(ConvertTarget::Text),
        "datetime" => Ok(ConvertTarget::Datetime),
        "cat" | "categorical" => Ok(ConvertTarget::Categorical),
        other => Err(format!("unknown conversion target \"{other}\"")),
    }
}

/// `KEY=VALUE` role bindings of a chart command, keys case-insensitive.
fn parse_roles(tokens: &[&str]) -> Result<ChartRequest, String> {
    let mut request = ChartRequest::default();
    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got \"{token}\""))?;
        match key.to_lowercase().as_str() {
            "x" => request.x = Some(value.to_string()),
            "y" | "cols" => request.y = parse_comma_list(value),
            "hue" => request.hue = Some(value.to_string()),
            "labels" => request.labels = Some(value.to_string()),
            "values" => request.values = Some(value.to_string()),
            "bins" => {
                request.bins = Some(
                    value
                        .parse()
                        .map_err(|_| format!("bins must be a count, got \"{value}\""))?,
                )
            }
            other => return Err(format!("unknown chart role \"{other}\"")),
        }
    }
    Ok(request)
}

fn parse_chart(tokens: &[&str]) -> Result<Event, String> {
    let (kind_token, roles) = tokens
        .split_first()
        .ok_or_else(|| "usage: chart KIND [ROLES...]".to_string())?;
    let kind = ChartKind::parse(kind_token)
        .ok_or_else(|| format!("unknown chart kind \"{kind_token}\""))?;
    Ok(Event::GenerateChart {
        kind,
        request: parse_roles(roles)?,
    })
}

fn parse_hide(target: &str) -> Result<Event, String> {
    match target.to_lowercase().as_str() {
        "filter" => Ok(Event::HideFilter),
        "cleaning" => Ok(Event::HideCleaning),
        other => ChartKind::parse(other)
            .map(Event::HideChart)
            .ok_or_else(|| format!("nothing to hide called \"{target}\"")),
    }
}

/// Parses one submitted command line into an event. Errors are plain user
/// guidance, shown verbatim in the status line.
pub fn parse_command(line: &str) -> Result<Event, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (verb, args) = tokens
        .split_first()
        .ok_or_else(|| "empty command".to_string())?;
    match (verb.to_lowercase().as_str(), args) {
        ("load", [path]) => Ok(Event::LoadPath(expand_path(path)?)),
        ("load", _) => Err("usage: load PATH".to_string()),
        ("filter", [column, value]) => Ok(Event::ApplyFilter(FilterSpec::Equality {
            column: (*column).to_string(),
            value: (*value).to_string(),
        })),
        ("filter", _) => Err("usage: filter COL VALUE".to_string()),
        ("range", [column, min, max]) => {
            let min = parse_f64(min, "MIN")?;
            let max = parse_f64(max, "MAX")?;
            Ok(Event::ApplyFilter(FilterSpec::Custom {
                filters: vec![((*column).to_string(), ColumnPredicate::Range(min, max))],
                display: vec![],
            }))
        }
        ("range", _) => Err("usage: range COL MIN MAX".to_string()),
        ("keep", [column, values]) => Ok(Event::ApplyFilter(FilterSpec::Custom {
            filters: vec![(
                (*column).to_string(),
                ColumnPredicate::Membership(parse_comma_list(values)),
            )],
            display: vec![],
        })),
        ("keep", _) => Err("usage: keep COL V1,V2,...".to_string()),
        ("impute", [column, method, rest @ ..]) => Ok(Event::Impute {
            column: (*column).to_string(),
            method: parse_impute(method, rest)?,
        }),
        ("impute", _) => Err("usage: impute COL mean|median|mode|const VALUE".to_string()),
        ("convert", [column, target]) => Ok(Event::Convert {
            column: (*column).to_string(),
            target: parse_convert(target)?,
        }),
        ("convert", _) => Err("usage: convert COL int|float|str|datetime|cat".to_string()),
        ("dropcols", [columns]) => Ok(Event::Drop {
            columns: parse_comma_list(columns),
            rows: vec![],
        }),
        ("dropcols", _) => Err("usage: dropcols C1,C2,...".to_string()),
        ("droprows", [rows]) => {
            let rows = parse_comma_list(rows)
                .iter()
                .map(|r| {
                    r.parse()
                        .map_err(|_| format!("row index must be a count, got \"{r}\""))
                })
                .collect::<Result<Vec<usize>, String>>()?;
            Ok(Event::Drop {
                columns: vec![],
                rows,
            })
        }
        ("droprows", _) => Err("usage: droprows R1,R2,...".to_string()),
        ("rename", [old, new]) => Ok(Event::Rename {
            old: (*old).to_string(),
            new: (*new).to_string(),
        }),
        ("rename", _) => Err("usage: rename OLD NEW".to_string()),
        ("reindex", [action, rest @ ..]) => match (action.to_lowercase().as_str(), rest) {
            ("reset", []) => Ok(Event::Reindex(ReindexAction::Reset)),
            ("set", [column]) => Ok(Event::Reindex(ReindexAction::Set((*column).to_string()))),
            _ => Err("usage: reindex reset | reindex set COL".to_string()),
        },
        ("chart", rest) => parse_chart(rest),
        ("hide", [target]) => parse_hide(target),
        ("hide", _) => Err("usage: hide filter|cleaning|CHART".to_string()),
        ("save", [path]) => Ok(Event::SaveChart(expand_path(path)?)),
        ("save", _) => Err("usage: save PATH".to_string()),
        (other, _) => Err(format!("unknown command \"{other}\"")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_and_save_expand_paths() {
        match parse_command("load data.csv").unwrap() {
            Event::LoadPath(path) => assert_eq!(path, PathBuf::from("data.csv")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            parse_command("save out.png").unwrap(),
            Event::SaveChart(_)
        ));
        assert!(parse_command("load").is_err());
    }

    #[test]
    fn filter_commands() {
        assert!(matches!(
            parse_command("filter city Berlin").unwrap(),
            Event::ApplyFilter(FilterSpec::Equality { .. })
        ));
        match parse_command("range price 10 99.5").unwrap() {
            Event::ApplyFilter(FilterSpec::Custom { filters, .. }) => {
                assert!(matches!(
                    filters[0].1,
                    ColumnPredicate::Range(min, max) if min == 10.0 && max == 99.5
                ));
            }
            other => panic!("unexpected event {other:?}"),
        }
        match parse_command("keep cat a,b").unwrap() {
            Event::ApplyFilter(FilterSpec::Custom { filters, .. }) => {
                assert!(matches!(&filters[0].1, ColumnPredicate::Membership(vs) if vs.len() == 2));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(parse_command("range price ten 20").is_err());
    }

    #[test]
    fn cleaning_commands() {
        assert!(matches!(
            parse_command("impute age median").unwrap(),
            Event::Impute {
                method: ImputeMethod::Median,
                ..
            }
        ));
        match parse_command("impute name const unknown").unwrap() {
            Event::Impute {
                method: ImputeMethod::Constant(v),
                ..
            } => assert_eq!(v, "unknown"),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(parse_command("impute name const").is_err());
        assert!(matches!(
            parse_command("convert age int").unwrap(),
            Event::Convert {
                target: ConvertTarget::Integer,
                ..
            }
        ));
        assert!(parse_command("convert age blob").is_err());
        match parse_command("droprows 0,2,5").unwrap() {
            Event::Drop { rows, .. } => assert_eq!(rows, vec![0, 2, 5]),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            parse_command("reindex set id").unwrap(),
            Event::Reindex(ReindexAction::Set(_))
        ));
        assert!(parse_command("reindex nope").is_err());
    }

    #[test]
    fn chart_commands() {
        match parse_command("chart bar X=city Y=price,count").unwrap() {
            Event::GenerateChart { kind, request } => {
                assert_eq!(kind, ChartKind::Bar);
                assert_eq!(request.x.as_deref(), Some("city"));
                assert_eq!(request.y, vec!["price", "count"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match parse_command("chart hist COLS=price BINS=20").unwrap() {
            Event::GenerateChart { kind, request } => {
                assert_eq!(kind, ChartKind::Histogram);
                assert_eq!(request.bins, Some(20));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            parse_command("chart heatmap").unwrap(),
            Event::GenerateChart {
                kind: ChartKind::Heatmap,
                ..
            }
        ));
        assert!(parse_command("chart bar X").is_err());
        assert!(parse_command("chart donut").is_err());
    }

    #[test]
    fn hide_commands() {
        assert!(matches!(
            parse_command("hide filter").unwrap(),
            Event::HideFilter
        ));
        assert!(matches!(
            parse_command("hide scatter").unwrap(),
            Event::HideChart(ChartKind::Scatter)
        ));
        assert!(parse_command("hide everything").is_err());
    }

    #[test]
    fn command_mode_round_trip() {
        let mut controller = Controller::new(&ScrubConfig::default());
        assert!(controller.prompt().is_none());
        let colon = KeyEvent::new(KeyCode::Char(':'), event::KeyModifiers::NONE);
        assert!(controller.handle_key(colon).is_none());
        assert!(controller.prompt().is_some());
        for c in "rename a b".chars() {
            controller.handle_key(KeyEvent::new(KeyCode::Char(c), event::KeyModifiers::NONE));
        }
        let submitted =
            controller.handle_key(KeyEvent::new(KeyCode::Enter, event::KeyModifiers::NONE));
        assert!(matches!(submitted, Some(Event::Rename { .. })));
        assert!(controller.prompt().is_none());

        controller.handle_key(colon);
        for c in "frobnicate".chars() {
            controller.handle_key(KeyEvent::new(KeyCode::Char(c), event::KeyModifiers::NONE));
        }
        let submitted =
            controller.handle_key(KeyEvent::new(KeyCode::Enter, event::KeyModifiers::NONE));
        assert!(matches!(submitted, Some(Event::CommandError(_))));
    }

    #[test]
    fn plain_keys_map_to_inspections() {
        let mut controller = Controller::new(&ScrubConfig::default());
        let key = |c| KeyEvent::new(KeyCode::Char(c), event::KeyModifiers::NONE);
        assert!(matches!(
            controller.handle_key(key('h')),
            Some(Event::Inspect(InspectAction::Head))
        ));
        assert!(matches!(controller.handle_key(key('q')), Some(Event::Quit)));
        assert!(controller.handle_key(key('z')).is_none());
    }
}
