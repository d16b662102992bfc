use crate::constants::{ARTIST_IDENTITIES_TABLE, FINAL_RESOLUTION_STEP};
use crate::error::{Result, WarehouseError};
use crate::resolution::ResolvedArtistIdentity;
use crate::schema::{TableSpec, ARTISTS};
use crate::warehouse::{TableRow, TransactionalExecutor, Value};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistRow {
    pub name: String,
    pub artist_id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
}

impl TableRow for ArtistRow {
    fn table() -> &'static TableSpec {
        &ARTISTS
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.name.clone().into(),
            self.artist_id.clone().into(),
            self.latitude.into(),
            self.longitude.into(),
            self.location.clone().into(),
        ]
    }
}

impl From<&ResolvedArtistIdentity> for ArtistRow {
    fn from(identity: &ResolvedArtistIdentity) -> Self {
        Self {
            name: identity.artist_name.clone(),
            artist_id: identity.recalculated_artist_id.clone(),
            latitude: identity.latitude,
            longitude: identity.longitude,
            location: identity.location.clone(),
        }
    }
}

pub fn build_artists(identities: &[ResolvedArtistIdentity]) -> Vec<ArtistRow> {
    identities
        .iter()
        .filter(|i| i.step == FINAL_RESOLUTION_STEP)
        .map(ArtistRow::from)
        .collect()
}

/// Canonical identities as committed by the intermediate staging batch.
pub async fn read_canonical_identities(executor: &dyn TransactionalExecutor) -> Result<Vec<ResolvedArtistIdentity>> {
    let sql = format!(
        "SELECT original_artist_id, artist_name, recalculated_artist_id, artist_latitude, artist_longitude, artist_location \
         FROM {} WHERE step = {} ORDER BY artist_name",
        ARTIST_IDENTITIES_TABLE, FINAL_RESOLUTION_STEP
    );
    executor
        .query(&sql)
        .await?
        .iter()
        .map(|r| {
            let original_artist_id = r
                .text(0)
                .ok_or_else(|| WarehouseError::MissingField("original_artist_id".into()))?;
            Ok(ResolvedArtistIdentity {
                recalculated_artist_id: r.text(2).unwrap_or_else(|| original_artist_id.clone()),
                original_artist_id,
                artist_name: r.text(1).ok_or_else(|| WarehouseError::MissingField("artist_name".into()))?,
                latitude: r.real(3),
                longitude: r.real(4),
                location: r.text(5),
                step: FINAL_RESOLUTION_STEP,
            })
        })
        .collect()
}
