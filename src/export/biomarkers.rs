//! Sex-scoped biomarker detail resolution

use crate::model::{Biomarker, Sex, SexDetail};

/// Pick the detail variant of `biomarker` that applies to `sex`.
///
/// An exact match wins; otherwise the variant valid for all sexes is used.
/// Variants without an id can never be fetched and are ignored. With no
/// recorded sex only the "All" variant qualifies.
pub fn resolve_detail_variant(biomarker: &Biomarker, sex: Option<Sex>) -> Option<&SexDetail> {
    let usable = || {
        biomarker
            .sex_details
            .iter()
            .filter(|variant| !variant.id.is_empty())
    };

    let exact = sex.and_then(|sex| usable().find(|variant| Sex::parse(&variant.sex) == Some(sex)));
    exact.or_else(|| usable().find(|variant| Sex::parse(&variant.sex) == Some(Sex::All)))
}
