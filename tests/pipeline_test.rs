use std::io::Write;

use polars::prelude::*;

use scrub::cleaning::{ConvertTarget, ImputeMethod, ReindexAction};
use scrub::controller::parse_command;
use scrub::domain::{ScrubConfig, ScrubError};
use scrub::session::{Event, InspectAction, Session};
use scrub::viz::{ChartKind, ChartRequest, ChartSpec, RenderBackend};

struct StubRenderer;

impl RenderBackend for StubRenderer {
    fn render(&self, _spec: &ChartSpec) -> Result<Vec<u8>, ScrubError> {
        Ok(vec![0x89, b'P', b'N', b'G', b'!'])
    }
}

fn session() -> Session {
    Session::with_renderer(ScrubConfig::default(), Box::new(StubRenderer))
}

fn write_csv(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("listings.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        "id,city,price,year\n\
         1,Berlin,100.0,1990\n\
         2,Berlin,,2001\n\
         3,Paris,80.0,1985\n\
         4,Madrid,120.0,2010\n\
         5,Paris,60.0,1999\n"
    )
    .unwrap();
    path
}

fn frame(session: &Session) -> &DataFrame {
    session.dataset().table().unwrap()
}

fn last_error(session: &Session) -> Option<String> {
    session
        .view()
        .notices
        .iter()
        .find(|n| n.is_error)
        .map(|n| n.text.clone())
}

#[test]
fn load_clean_filter_chart_round() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session();

    s.apply(Event::LoadPath(write_csv(&dir)));
    assert_eq!(last_error(&s), None);
    assert_eq!(frame(&s).shape(), (5, 4));

    // Only price is missing a value.
    s.apply(Event::Inspect(InspectAction::Missing));
    let view = s.view();
    assert_eq!(view.rows, vec![vec!["price".to_string(), "1".to_string()]]);

    s.apply(Event::Impute {
        column: "price".to_string(),
        method: ImputeMethod::Mean,
    });
    assert_eq!(last_error(&s), None);
    let prices: Vec<f64> = frame(&s)
        .column("price")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(prices, vec![100.0, 90.0, 80.0, 120.0, 60.0]);

    // Imputing a clean column is refused.
    s.apply(Event::Impute {
        column: "city".to_string(),
        method: ImputeMethod::Mode,
    });
    assert!(last_error(&s).unwrap().contains("no missing values"));

    // A failed conversion leaves the column untouched.
    s.apply(Event::Convert {
        column: "city".to_string(),
        target: ConvertTarget::Integer,
    });
    assert!(last_error(&s).is_some());
    assert_eq!(frame(&s).column("city").unwrap().dtype(), &DataType::String);

    s.apply(Event::Convert {
        column: "year".to_string(),
        target: ConvertTarget::Float,
    });
    assert_eq!(last_error(&s), None);
    assert_eq!(frame(&s).column("year").unwrap().dtype(), &DataType::Float64);

    // Display filter never mutates the table.
    s.apply(parse_command("filter city Paris").unwrap());
    assert_eq!(s.view().total_rows, 2);
    assert_eq!(frame(&s).height(), 5);

    s.apply(Event::Rename {
        old: "price".to_string(),
        new: "eur".to_string(),
    });
    s.apply(Event::Drop {
        columns: vec!["year".to_string()],
        rows: vec![2],
    });
    assert_eq!(last_error(&s), None);
    assert_eq!(frame(&s).shape(), (4, 3));
    assert!(frame(&s).column("eur").is_ok());

    s.apply(Event::Reindex(ReindexAction::Set("id".to_string())));
    assert_eq!(last_error(&s), None);
    let view = s.view();
    assert_eq!(view.headers[0], "id");
    // Row with positional index 2 (id 3) was dropped before promotion.
    let ids: Vec<String> = view.rows.iter().map(|r| r[0].clone()).collect();
    assert_eq!(ids, vec!["1", "2", "4", "5"]);

    s.apply(Event::GenerateChart {
        kind: ChartKind::Bar,
        request: ChartRequest {
            x: Some("city".to_string()),
            y: vec!["eur".to_string()],
            ..ChartRequest::default()
        },
    });
    assert_eq!(last_error(&s), None);
    let name = s.download().unwrap().file_name.clone();
    assert!(name.starts_with("bar_") && name.ends_with(".png"));

    let out = dir.path().join("chart.png");
    s.apply(Event::SaveChart(out.clone()));
    assert_eq!(last_error(&s), None);
    assert_eq!(std::fs::read(&out).unwrap(), vec![0x89, b'P', b'N', b'G', b'!']);
}

#[test]
fn command_driven_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(&dir);
    let mut s = session();

    let load = format!("load {}", path.display());
    for line in [
        load.as_str(),
        "impute price median",
        "keep city Berlin,Paris",
        "range year 1990 2005",
        "dropcols id",
        "chart hist COLS=price BINS=5",
    ] {
        s.apply(parse_command(line).unwrap());
        assert_eq!(last_error(&s), None, "command failed: {line}");
    }
    assert_eq!(frame(&s).shape(), (5, 3));
    assert!(s.download().is_some());
}

#[test]
fn errors_never_end_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session();

    s.apply(Event::LoadPath(dir.path().join("missing.csv")));
    assert!(last_error(&s).is_some());
    assert!(s.dataset().table().is_err());

    // Still usable: a good load afterwards succeeds.
    s.apply(Event::LoadPath(write_csv(&dir)));
    assert_eq!(last_error(&s), None);

    // Stale column reference after a rename is a per-step failure.
    s.apply(parse_command("rename city location").unwrap());
    s.apply(parse_command("filter city Paris").unwrap());
    assert!(last_error(&s).unwrap().contains("city"));
    s.apply(parse_command("filter location Paris").unwrap());
    assert_eq!(last_error(&s), None);
}

#[test]
fn unknown_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.xlsx");
    std::fs::write(&path, "not a table").unwrap();
    let mut s = session();
    s.apply(Event::LoadPath(path));
    assert_eq!(last_error(&s), Some("Unknown file type".to_string()));
}
