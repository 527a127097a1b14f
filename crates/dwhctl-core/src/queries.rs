//! SQL templates for the staging tables and the star schema
//!
//! DDL and transforms are fixed text. The COPY statements are assembled from
//! the `S3` section and the cluster role ARN.

use crate::config::S3Section;
use serde::Serialize;
use std::fmt;

pub const STAGING_EVENTS: &str = "staging_events";
pub const STAGING_SONGS: &str = "staging_songs";
pub const SONGPLAYS: &str = "songplays";
pub const USERS: &str = "users";
pub const SONGS: &str = "songs";
pub const ARTISTS: &str = "artists";
pub const TIME: &str = "time";

/// Drop and create order
pub const TABLES: [&str; 7] = [STAGING_EVENTS, STAGING_SONGS, SONGPLAYS, USERS, SONGS, ARTISTS, TIME];

pub const STAGING_EVENTS_CREATE: &str = "
CREATE TABLE IF NOT EXISTS staging_events(
    artist TEXT,
    auth TEXT,
    first_name TEXT,
    gender TEXT,
    item_in_session INTEGER,
    last_name TEXT,
    length NUMERIC,
    level TEXT,
    location TEXT,
    method TEXT,
    page TEXT,
    registration NUMERIC,
    session_id INTEGER,
    song TEXT,
    status INTEGER,
    ts BIGINT,
    user_agent TEXT,
    user_id INTEGER
);
";

pub const STAGING_SONGS_CREATE: &str = "
CREATE TABLE IF NOT EXISTS staging_songs(
    num_songs INTEGER NOT NULL,
    artist_id TEXT,
    artist_location TEXT,
    artist_latitude NUMERIC,
    artist_longitude NUMERIC,
    artist_name TEXT,
    song_id TEXT,
    title TEXT,
    duration NUMERIC,
    year INTEGER
);
";

pub const SONGPLAYS_CREATE: &str = "
CREATE TABLE IF NOT EXISTS songplays(
    songplay_id INT IDENTITY(0,1) PRIMARY KEY,
    start_time TIMESTAMP sortkey,
    user_id INTEGER NOT NULL distkey,
    level TEXT NOT NULL,
    song_id TEXT,
    artist_id TEXT,
    session_id INTEGER,
    location TEXT,
    user_agent TEXT
);
";

pub const USERS_CREATE: &str = "
CREATE TABLE IF NOT EXISTS users(
    user_id INTEGER PRIMARY KEY,
    first_name TEXT,
    last_name TEXT,
    gender TEXT,
    level TEXT sortkey
);
";

pub const SONGS_CREATE: &str = "
CREATE TABLE IF NOT EXISTS songs(
    song_id TEXT NOT NULL PRIMARY KEY,
    title TEXT,
    artist_id TEXT NOT NULL sortkey,
    year INTEGER NOT NULL,
    duration NUMERIC NOT NULL
);
";

pub const ARTISTS_CREATE: &str = "
CREATE TABLE IF NOT EXISTS artists(
    artist_id TEXT NOT NULL PRIMARY KEY sortkey,
    name TEXT distkey,
    location TEXT,
    latitude NUMERIC,
    longitude NUMERIC
);
";

pub const TIME_CREATE: &str = "
CREATE TABLE IF NOT EXISTS time(
    start_time TIMESTAMP NOT NULL PRIMARY KEY sortkey,
    hour INTEGER NOT NULL,
    day INTEGER NOT NULL,
    week INTEGER NOT NULL,
    month INTEGER NOT NULL,
    year INTEGER NOT NULL,
    weekday INTEGER NOT NULL
);
";

pub const SONGPLAYS_INSERT: &str = "
INSERT INTO songplays(start_time, user_id, level, song_id, artist_id, session_id, location, user_agent)
    SELECT TIMESTAMP 'epoch' + se.ts/1000 * INTERVAL '1 second' AS start_time,
    se.user_id,
    se.level,
    ss.song_id,
    ss.artist_id,
    se.session_id,
    se.location,
    se.user_agent
    FROM staging_events se
    JOIN staging_songs ss
    ON se.artist = ss.artist_name AND se.length = ss.duration AND se.song = ss.title
    WHERE se.page = 'NextSong';
";

pub const USERS_INSERT: &str = "
INSERT INTO users(user_id, first_name, last_name, gender, level)
    SELECT DISTINCT user_id, first_name, last_name, gender, level
    FROM staging_events
    WHERE page = 'NextSong';
";

pub const SONGS_INSERT: &str = "
INSERT INTO songs(song_id, title, artist_id, year, duration)
    SELECT DISTINCT song_id, title, artist_id, year, duration
    FROM staging_songs;
";

pub const ARTISTS_INSERT: &str = "
INSERT INTO artists(artist_id, name, location, latitude, longitude)
    SELECT DISTINCT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
    FROM staging_songs;
";

pub const TIME_INSERT: &str = "
INSERT INTO time(start_time, hour, day, week, month, year, weekday)
    SELECT start_time,
           EXTRACT(hour FROM start_time),
           EXTRACT(day FROM start_time),
           EXTRACT(week FROM start_time),
           EXTRACT(month FROM start_time),
           EXTRACT(year FROM start_time),
           EXTRACT(dow FROM start_time)
           FROM songplays;
";

/// What a statement does to its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Drop,
    Create,
    Copy,
    Insert,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::Drop,
        StatementKind::Create,
        StatementKind::Copy,
        StatementKind::Insert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Drop => "drop",
            StatementKind::Create => "create",
            StatementKind::Copy => "copy",
            StatementKind::Insert => "insert",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SQL statement and the table it targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub table: &'static str,
    pub kind: StatementKind,
    pub sql: String,
}

impl Statement {
    fn new(table: &'static str, kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            table,
            kind,
            sql: sql.into(),
        }
    }
}

/// The four ordered statement lists of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySet {
    pub drop: Vec<Statement>,
    pub create: Vec<Statement>,
    pub copy: Vec<Statement>,
    pub insert: Vec<Statement>,
}

impl QuerySet {
    /// Assemble every list from the S3 locations and the cluster role ARN
    pub fn build(s3: &S3Section, iam_role_arn: &str) -> Self {
        Self {
            drop: drop_statements(),
            create: create_statements(),
            copy: copy_statements(s3, iam_role_arn),
            insert: insert_statements(),
        }
    }

    pub fn statements(&self, kind: StatementKind) -> &[Statement] {
        match kind {
            StatementKind::Drop => &self.drop,
            StatementKind::Create => &self.create,
            StatementKind::Copy => &self.copy,
            StatementKind::Insert => &self.insert,
        }
    }

    /// All lists in execution order: drop, create, copy, insert
    pub fn lists(&self) -> [(StatementKind, &[Statement]); 4] {
        StatementKind::ALL.map(|kind| (kind, self.statements(kind)))
    }
}

pub fn drop_statements() -> Vec<Statement> {
    TABLES
        .into_iter()
        .map(|table| {
            Statement::new(
                table,
                StatementKind::Drop,
                format!("DROP TABLE IF EXISTS {};", table),
            )
        })
        .collect()
}

pub fn create_statements() -> Vec<Statement> {
    [
        (STAGING_EVENTS, STAGING_EVENTS_CREATE),
        (STAGING_SONGS, STAGING_SONGS_CREATE),
        (SONGPLAYS, SONGPLAYS_CREATE),
        (USERS, USERS_CREATE),
        (SONGS, SONGS_CREATE),
        (ARTISTS, ARTISTS_CREATE),
        (TIME, TIME_CREATE),
    ]
    .into_iter()
    .map(|(table, sql)| Statement::new(table, StatementKind::Create, sql))
    .collect()
}

pub fn copy_statements(s3: &S3Section, iam_role_arn: &str) -> Vec<Statement> {
    let credentials = sql_literal(&format!("aws_iam_role={}", iam_role_arn));
    let events = format!(
        "
COPY staging_events
    FROM {}
    CREDENTIALS {}
    FORMAT AS JSON {};
",
        sql_literal(&s3.log_data),
        credentials,
        sql_literal(json_format(&s3.log_jsonpath)),
    );
    let songs = format!(
        "
COPY staging_songs
    FROM {}
    CREDENTIALS {}
    FORMAT AS JSON 'auto';
",
        sql_literal(&s3.song_data),
        credentials,
    );
    vec![
        Statement::new(STAGING_EVENTS, StatementKind::Copy, events),
        Statement::new(STAGING_SONGS, StatementKind::Copy, songs),
    ]
}

pub fn insert_statements() -> Vec<Statement> {
    [
        (SONGPLAYS, SONGPLAYS_INSERT),
        (USERS, USERS_INSERT),
        (SONGS, SONGS_INSERT),
        (ARTISTS, ARTISTS_INSERT),
        (TIME, TIME_INSERT),
    ]
    .into_iter()
    .map(|(table, sql)| Statement::new(table, StatementKind::Insert, sql))
    .collect()
}

fn json_format(jsonpath: &str) -> &str {
    let jsonpath = jsonpath.trim();
    if jsonpath.is_empty() || jsonpath.eq_ignore_ascii_case("auto") {
        "auto"
    } else {
        jsonpath
    }
}

/// Quote a value as a SQL string literal, doubling embedded quotes
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
