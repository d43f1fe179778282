//! Conversions between domain `u64` identifiers and the signed columns the
//! store actually has. EVE identifiers never approach `i64::MAX` in
//! practice; this is a defensive boundary, not a format choice.

use anyhow::{Context, Result};
use sk_schemas::{DomainId, Isk};

pub fn domain_id_to_db(id: DomainId) -> Result<i64> {
    i64::try_from(id.get()).with_context(|| format!("domain id {id} exceeds i64 range"))
}

pub fn domain_id_from_db(id: i64) -> DomainId {
    DomainId(id as u64)
}

pub fn opt_domain_id_to_db(id: Option<DomainId>) -> Result<Option<i64>> {
    id.map(domain_id_to_db).transpose()
}

pub fn domain_ids_to_db(ids: impl IntoIterator<Item = DomainId>) -> Result<Vec<i64>> {
    ids.into_iter().map(domain_id_to_db).collect()
}

pub fn domain_ids_from_db(ids: Vec<i64>) -> Vec<DomainId> {
    ids.into_iter().map(domain_id_from_db).collect()
}

pub fn isk_to_db(isk: Isk) -> Result<i64> {
    i64::try_from(isk.get()).with_context(|| format!("isk value {isk} exceeds i64 range"))
}

pub fn opt_isk_to_db(isk: Option<Isk>) -> Result<Option<i64>> {
    isk.map(isk_to_db).transpose()
}

pub fn isk_from_db(v: i64) -> Isk {
    Isk(v as u64)
}

pub fn opt_isk_from_db(v: Option<i64>) -> Option<Isk> {
    v.map(isk_from_db)
}
