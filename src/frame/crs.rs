use std::fmt;

use serde::Deserialize;
use thiserror::Error;

pub type EpsgCode = u32;

/// Whether a reference frame measures coordinates in angles or in linear units.
/// Lengths and areas are only meaningful in a projected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FrameKind {
    Geographic,
    Projected,
}

/// A coordinate reference frame identifier: an EPSG code plus its unit kind.
///
/// The kind is declared at construction rather than queried from a CRS
/// database, so that precondition checks work without touching any
/// projection backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Crs {
    pub epsg: EpsgCode,
    pub kind: FrameKind,
}

impl Crs {
    pub fn wgs84() -> Self {
        Self::geographic(4326)
    }

    pub fn geographic(epsg: EpsgCode) -> Self {
        Self {
            epsg,
            kind: FrameKind::Geographic,
        }
    }

    pub fn projected(epsg: EpsgCode) -> Self {
        Self {
            epsg,
            kind: FrameKind::Projected,
        }
    }

    /// The authority string understood by PROJ, e.g. "EPSG:4326".
    pub fn authority_string(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }

    pub fn is_projected(&self) -> bool {
        self.kind == FrameKind::Projected
    }

    /// Check that this frame uses linear units, i.e. that lengths and areas
    /// computed from coordinates in it are physically meaningful.
    pub fn require_projected(&self) -> Result<(), FrameError> {
        if self.is_projected() {
            Ok(())
        } else {
            Err(FrameError::AngularUnits { crs: *self })
        }
    }

    /// Check that `other` is the same frame, as required by every binary
    /// spatial operation (clip, join, distance).
    pub fn require_same(&self, other: &Crs) -> Result<(), FrameError> {
        if self == other {
            Ok(())
        } else {
            Err(FrameError::IncompatibleReferenceFrame {
                expected: *self,
                found: *other,
            })
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FrameKind::Geographic => "geographic",
            FrameKind::Projected => "projected",
        };
        write!(f, "EPSG:{} ({})", self.epsg, kind)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("incompatible reference frames: expected {expected}, found {found}")]
    IncompatibleReferenceFrame { expected: Crs, found: Crs },
    #[error("{crs} uses angular units; lengths and areas require a projected frame")]
    AngularUnits { crs: Crs },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Crs, FrameError};

    #[rstest]
    #[case(Crs::wgs84(), "EPSG:4326")]
    #[case(Crs::projected(2157), "EPSG:2157")]
    fn test_authority_string(#[case] crs: Crs, #[case] expected: &str) {
        assert_eq!(expected, crs.authority_string());
    }

    #[test]
    fn test_require_projected() {
        assert!(Crs::projected(2157).require_projected().is_ok());

        let err = Crs::wgs84().require_projected().unwrap_err();
        assert_eq!(FrameError::AngularUnits { crs: Crs::wgs84() }, err);
    }

    #[test]
    fn test_require_same() {
        let itm = Crs::projected(2157);
        assert!(itm.require_same(&Crs::projected(2157)).is_ok());

        let err = itm.require_same(&Crs::wgs84()).unwrap_err();
        assert_eq!(
            FrameError::IncompatibleReferenceFrame {
                expected: itm,
                found: Crs::wgs84()
            },
            err
        );
    }

    #[test]
    fn test_same_code_different_kind_is_incompatible() {
        // A mislabeled frame kind must not slip through the equality check.
        let err = Crs::projected(4326).require_same(&Crs::wgs84());
        assert!(err.is_err());
    }
}
