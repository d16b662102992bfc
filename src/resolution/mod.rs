//! Artist identity resolution: score, classify, reconcile.

pub mod classifier;
pub mod resolver;
pub mod scorer;

pub use classifier::{classify, AmbiguityClass, AmbiguityFlags, ArtistCandidate};
pub use resolver::{IdentityResolver, ResolvedArtistIdentity, ResolverOptions};
pub use scorer::{score_observations, ScoredObservation};

use crate::constants::FINAL_RESOLUTION_STEP;
use crate::error::Result;
use crate::staging::RawSongObservation;

/// Everything the intermediate staging batch writes.
#[derive(Debug)]
pub struct ArtistResolution {
    pub candidates: Vec<ArtistCandidate>,
    pub identities: Vec<ResolvedArtistIdentity>,
}

impl ArtistResolution {
    /// Final rows, one per artist name.
    pub fn canonical(&self) -> impl Iterator<Item = &ResolvedArtistIdentity> {
        self.identities.iter().filter(|r| r.step == FINAL_RESOLUTION_STEP)
    }
}

pub fn resolve_artists(raw: &[RawSongObservation], options: ResolverOptions) -> Result<ArtistResolution> {
    let candidates = classify(score_observations(raw))?;
    let identities = IdentityResolver::new(options).resolve(&candidates)?.into_rows();
    Ok(ArtistResolution { candidates, identities })
}
