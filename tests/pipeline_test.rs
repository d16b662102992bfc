use anyhow::Result;
use serde_json::json;
use songplay_warehouse::config::Settings;
use songplay_warehouse::error::WarehouseError;
use songplay_warehouse::ingestion::LocalJsonLoader;
use songplay_warehouse::orchestrator::Orchestrator;
use songplay_warehouse::resolution::ResolverOptions;
use songplay_warehouse::schema::STAGING_EVENTS;
use songplay_warehouse::warehouse::{Row, SqliteWarehouse, TransactionalExecutor};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn write_json(path: &Path, value: serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, value.to_string())?;
    Ok(())
}

fn song(artist_id: &str, artist_name: &str, lat: Option<f64>, title: &str, year: i64) -> serde_json::Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": lat,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": format!("SO{}", title.len()),
        "title": title,
        "duration": 200.5,
        "year": year
    })
}

fn event(user_id: &str, ts: i64, level: &str, page: &str, item: i64) -> String {
    json!({
        "artist": "X",
        "auth": "Logged In",
        "firstName": "Lily",
        "gender": "F",
        "itemInSession": item,
        "lastName": "Koch",
        "length": 183.2,
        "level": level,
        "location": "Chicago-Naperville-Elgin, IL-IN-WI",
        "method": "PUT",
        "page": page,
        "registration": 1541048010796.0,
        "sessionId": 818,
        "song": "Intro",
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0",
        "userId": user_id
    })
    .to_string()
}

/// Song files, a day of event logs and a JSONPaths file under one temp dir.
fn fixture() -> Result<(TempDir, Settings)> {
    let dir = tempdir()?;
    let songs = dir.path().join("song_data");
    write_json(&songs.join("A/A/TRAAA.json"), song("A", "X", Some(10.5), "Intro", 2001))?;
    write_json(&songs.join("A/B/TRAAB.json"), song("B", "X", Some(11.0), "Intro", 2004))?;
    write_json(&songs.join("B/A/TRABA.json"), song("C", "Solo", None, "Alone", 0))?;

    let logs = dir.path().join("log_data/2018/11");
    fs::create_dir_all(&logs)?;
    let lines = [
        event("7", 1000, "free", "NextSong", 0),
        event("7", 2000, "paid", "NextSong", 1),
        event("7", 3000, "free", "Home", 2),
        event("", 4000, "free", "NextSong", 0),
        event("12", 1_541_192_230_796, "free", "NextSong", 3),
    ];
    fs::write(logs.join("2018-11-02-events.json"), lines.join("\n"))?;

    let paths: Vec<String> = STAGING_EVENTS
        .column_names()
        .iter()
        .map(|c| format!("$['{}']", c))
        .collect();
    let jsonpaths = dir.path().join("log_json_path.json");
    write_json(&jsonpaths, json!({ "jsonpaths": paths }))?;

    let settings = Settings::from_toml_str(&format!(
        r#"
[CLUSTER]
HOST = "localhost"
DB_NAME = "sparkify"
DB_USER = "etl"
DB_PASSWORD = "secret"
DB_PORT = 5439

[S3]
LOG_DATA = "file://{}"
SONG_DATA = "{}"
LOG_JSONPATH = "{}"
BUCKET_REGION = "us-west-2"

[IAM_ROLE]
ARN = "arn:aws:iam::000000000000:role/dwhRole"
"#,
        dir.path().join("log_data").display(),
        songs.display(),
        jsonpaths.display()
    ))?;
    Ok((dir, settings))
}

fn orchestrator(warehouse: Arc<SqliteWarehouse>, settings: Settings) -> Orchestrator {
    let loader = Arc::new(LocalJsonLoader::new(warehouse.clone()));
    Orchestrator::new(warehouse, loader, settings)
}

async fn dump(warehouse: &SqliteWarehouse) -> Result<Vec<Vec<Row>>> {
    let mut tables = Vec::new();
    for sql in [
        "SELECT * FROM artists ORDER BY name",
        "SELECT * FROM songs ORDER BY artist_name, title",
        "SELECT * FROM users ORDER BY user_id",
        "SELECT * FROM time ORDER BY time_key",
        "SELECT * FROM songplays ORDER BY songplay_id",
        "SELECT * FROM staging_artist_identities ORDER BY step, artist_name, original_artist_id",
    ] {
        tables.push(warehouse.query(sql).await?);
    }
    Ok(tables)
}

#[tokio::test]
async fn test_refresh_builds_star_schema() -> Result<()> {
    let (_dir, settings) = fixture()?;
    let warehouse = Arc::new(SqliteWarehouse::open_in_memory()?);
    let summary = orchestrator(warehouse.clone(), settings).refresh().await?;

    assert_eq!(summary.loads[0].rows, 5);
    assert_eq!(summary.loads[1].files, 3);
    assert_eq!(summary.skipped_plays, 1);

    // Shared name "X" converges on the greater id with that id's coordinates
    let artists = warehouse
        .query("SELECT name, artist_id, latitude, longitude FROM artists ORDER BY name")
        .await?;
    assert_eq!(artists.len(), 2);
    assert_eq!(artists[1].text(0).as_deref(), Some("X"));
    assert_eq!(artists[1].text(1).as_deref(), Some("B"));
    assert_eq!(artists[1].real(2), Some(11.0));
    assert_eq!(artists[1].real(3), None);

    // Latest play wins, navigation pages do not count
    let users = warehouse.query("SELECT user_id, level FROM users ORDER BY user_id").await?;
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].integer(0), Some(7));
    assert_eq!(users[0].text(1).as_deref(), Some("paid"));

    let songs = warehouse.query("SELECT artist_name, title, year FROM songs ORDER BY artist_name").await?;
    assert_eq!(songs.len(), 2);
    assert_eq!(songs[1].integer(2), Some(2004));

    let plays = warehouse
        .query("SELECT songplay_id, start_time_key, user_id, start_time FROM songplays ORDER BY songplay_id")
        .await?;
    assert_eq!(plays.len(), 3);
    assert_eq!(plays[0].integer(1), Some(1970010100));
    assert_eq!(plays[2].integer(1), Some(2018110220));
    assert_eq!(plays[2].text(3).as_deref(), Some("2018-11-02 20:57:10"));

    let hours = warehouse.query("SELECT time_key, day_of_week_name FROM time ORDER BY time_key").await?;
    assert_eq!(hours.len(), 2);
    assert_eq!(hours[0].text(1).as_deref(), Some("Thursday"));
    Ok(())
}

#[tokio::test]
async fn test_refresh_is_idempotent() -> Result<()> {
    let (_dir, settings) = fixture()?;
    let warehouse = Arc::new(SqliteWarehouse::open_in_memory()?);
    let orchestrator = orchestrator(warehouse.clone(), settings);

    orchestrator.refresh().await?;
    let first = dump(&warehouse).await?;

    orchestrator.refresh().await?;
    assert_eq!(dump(&warehouse).await?, first);

    // etl alone replaces, never appends
    orchestrator.run_etl().await?;
    assert_eq!(dump(&warehouse).await?, first);
    let raw = warehouse.query("SELECT COUNT(*) FROM staging_events").await?;
    assert_eq!(raw[0].integer(0), Some(5));
    Ok(())
}

#[tokio::test]
async fn test_every_name_has_one_canonical_identity() -> Result<()> {
    let (_dir, settings) = fixture()?;
    let warehouse = Arc::new(SqliteWarehouse::open_in_memory()?);
    orchestrator(warehouse.clone(), settings).refresh().await?;

    let duplicates = warehouse
        .query("SELECT artist_name FROM staging_artist_identities WHERE step = 6 GROUP BY artist_name HAVING COUNT(*) > 1")
        .await?;
    assert!(duplicates.is_empty());

    let converged = warehouse
        .query("SELECT DISTINCT recalculated_artist_id FROM staging_artist_identities WHERE step = 5 AND artist_name = 'X'")
        .await?;
    assert_eq!(converged.len(), 1);
    assert_eq!(converged[0].text(0).as_deref(), Some("B"));
    Ok(())
}

#[tokio::test]
async fn test_legacy_longitude_option_flows_to_artists() -> Result<()> {
    let (dir, settings) = fixture()?;
    write_json(
        &dir.path().join("song_data/A/C/TRAAC.json"),
        json!({"artist_id": "B", "artist_name": "X", "artist_latitude": 11.0, "artist_longitude": -87.6, "title": "Outro"}),
    )?;
    let warehouse = Arc::new(SqliteWarehouse::open_in_memory()?);

    orchestrator(warehouse.clone(), settings.clone()).refresh().await?;
    let artists = warehouse.query("SELECT longitude FROM artists WHERE name = 'X'").await?;
    assert_eq!(artists[0].real(0), Some(-87.6));

    orchestrator(warehouse.clone(), settings)
        .with_resolver_options(ResolverOptions {
            drop_ambiguous_longitude: true,
        })
        .refresh()
        .await?;
    let artists = warehouse.query("SELECT longitude FROM artists WHERE name = 'X'").await?;
    assert_eq!(artists[0].real(0), None);
    Ok(())
}

#[tokio::test]
async fn test_missing_source_fails_before_the_star_schema() -> Result<()> {
    let (_dir, mut settings) = fixture()?;
    settings.s3.song_data = "s3://udacity-dend/song_data".to_string();
    let warehouse = Arc::new(SqliteWarehouse::open_in_memory()?);
    let orchestrator = orchestrator(warehouse.clone(), settings);

    orchestrator.create_tables().await?;
    let result = orchestrator.run_etl().await;
    assert!(matches!(result, Err(WarehouseError::UnsupportedSource { .. })));

    let plays = warehouse.query("SELECT COUNT(*) FROM songplays").await?;
    assert_eq!(plays[0].integer(0), Some(0));
    Ok(())
}
