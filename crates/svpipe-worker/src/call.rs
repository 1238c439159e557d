//! SV call record carried through the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural variant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SvType {
    Ins,
    Del,
    Dup,
    Inv,
    Bnd,
}

impl fmt::Display for SvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ins => "INS",
            Self::Del => "DEL",
            Self::Dup => "DUP",
            Self::Inv => "INV",
            Self::Bnd => "BND",
        };
        f.write_str(s)
    }
}

/// One SV call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvCall {
    /// Call identifier.
    pub id: String,

    /// Contig the call lies on.
    pub contig: String,

    /// 1-based start position.
    pub position: u64,

    /// Variant type.
    pub svtype: SvType,

    /// Signed length; negative for deletions, zero for breakends.
    #[serde(default)]
    pub svlen: i64,

    /// Number of supporting reads.
    #[serde(default)]
    pub support: u32,
}

impl SvCall {
    /// Check the record is usable. Returns the reason if not.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("call has an empty id".to_string());
        }
        if self.contig.is_empty() {
            return Err(format!("call {} has an empty contig", self.id));
        }
        if self.position == 0 {
            return Err(format!("call {} has position 0 (positions are 1-based)", self.id));
        }
        match self.svtype {
            SvType::Del if self.svlen > 0 => {
                Err(format!("deletion {} has positive length {}", self.id, self.svlen))
            }
            SvType::Ins | SvType::Dup if self.svlen < 0 => {
                Err(format!("{} {} has negative length {}", self.svtype, self.id, self.svlen))
            }
            _ => Ok(()),
        }
    }
}
