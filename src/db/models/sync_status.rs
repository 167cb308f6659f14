// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

use chrono::NaiveDateTime;
use diesel::prelude::*;
use std::fmt;

use crate::db::schema::sync_status;

/// §3: `source` is one of `{ARCHIVE, API, BACKFILL, STREAMING}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncSource {
    Archive,
    Api,
    Backfill,
    Streaming,
}

impl SyncSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncSource::Archive => "ARCHIVE",
            SyncSource::Api => "API",
            SyncSource::Backfill => "BACKFILL",
            SyncSource::Streaming => "STREAMING",
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARCHIVE" => Ok(SyncSource::Archive),
            "API" => Ok(SyncSource::Api),
            "BACKFILL" => Ok(SyncSource::Backfill),
            "STREAMING" => Ok(SyncSource::Streaming),
            other => Err(format!("unknown sync source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = sync_status)]
pub struct SyncStatus {
    pub id: i64,
    pub network: String,
    pub chain_id: i32,
    pub prefix: String,
    pub source: String,
    pub object_key: Option<String>,
    pub from_height: Option<i64>,
    pub to_height: Option<i64>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = sync_status)]
pub struct NewSyncStatus {
    pub network: String,
    pub chain_id: i32,
    pub prefix: String,
    pub source: String,
    pub object_key: Option<String>,
    pub from_height: Option<i64>,
    pub to_height: Option<i64>,
}

impl NewSyncStatus {
    pub fn archive_cursor(network: &str, chain_id: i32, prefix: &str, key: String) -> Self {
        NewSyncStatus {
            network: network.to_string(),
            chain_id,
            prefix: prefix.to_string(),
            source: SyncSource::Archive.as_str().to_string(),
            object_key: Some(key),
            from_height: None,
            to_height: None,
        }
    }

    pub fn height_cursor(
        network: &str,
        chain_id: i32,
        prefix: &str,
        source: SyncSource,
        from_height: i64,
        to_height: i64,
    ) -> Self {
        NewSyncStatus {
            network: network.to_string(),
            chain_id,
            prefix: prefix.to_string(),
            source: source.as_str().to_string(),
            object_key: None,
            from_height: Some(from_height),
            to_height: Some(to_height),
        }
    }
}
