//! Type-specific media metadata.
//!
//! Every metadata kind has an explicit table mapping its flattened field
//! names (`artist`, `fNumber`, ...) to typed struct fields. The same table
//! drives query evaluation (`audio.artist:...`), the metadata written back
//! to storage (`libre.graph.audio.artist`) and the extractor reading it in.

use super::document::FieldValue;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix for media metadata stored as arbitrary metadata on a resource.
pub const STORAGE_METADATA_PREFIX: &str = "libre.graph.";

macro_rules! media_kind {
    (@ty text) => { String };
    (@ty int) => { i64 };
    (@ty float) => { f64 };
    (@ty flag) => { bool };
    (@ty time) => { DateTime<Utc> };

    (@value text, $v:expr) => { FieldValue::Text($v.clone()) };
    (@value int, $v:expr) => { FieldValue::Number(*$v as f64) };
    (@value float, $v:expr) => { FieldValue::Number(*$v) };
    (@value flag, $v:expr) => { FieldValue::Bool(*$v) };
    (@value time, $v:expr) => { FieldValue::Time(*$v) };

    (@parse text, $raw:expr, $key:expr) => { Ok::<String, Error>($raw.to_string()) };
    (@parse int, $raw:expr, $key:expr) => { $raw.trim().parse::<i64>().map_err(|e| invalid($key, &e)) };
    (@parse float, $raw:expr, $key:expr) => { $raw.trim().parse::<f64>().map_err(|e| invalid($key, &e)) };
    (@parse flag, $raw:expr, $key:expr) => { $raw.trim().parse::<bool>().map_err(|e| invalid($key, &e)) };
    (@parse time, $raw:expr, $key:expr) => {
        DateTime::parse_from_rfc3339($raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| invalid($key, &e))
    };

    (@render text, $v:expr) => { $v.clone() };
    (@render int, $v:expr) => { $v.to_string() };
    (@render float, $v:expr) => { $v.to_string() };
    (@render flag, $v:expr) => { $v.to_string() };
    (@render time, $v:expr) => { $v.to_rfc3339_opts(SecondsFormat::Secs, true) };

    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ident => $key:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: Option<media_kind!(@ty $ty)>, )*
        }

        impl $name {
            /// Kind name used as the field prefix (`<kind>.<field>`).
            pub const KIND: &'static str = $kind;

            /// Flattened field names, in declaration order.
            pub const FIELDS: &'static [&'static str] = &[$($key),*];

            /// Reads a field by its flattened name.
            #[must_use]
            #[allow(clippy::cast_precision_loss)]
            pub fn get(&self, key: &str) -> Option<FieldValue> {
                match key {
                    $( $key => self.$field.as_ref().map(|v| media_kind!(@value $ty, v)), )*
                    _ => None,
                }
            }

            /// Sets a field from its string form.
            ///
            /// Returns `Ok(false)` if the key is not a field of this kind.
            ///
            /// # Errors
            ///
            /// Returns [`Error::BadRequest`] if the value does not parse as the field's type.
            pub fn set(&mut self, key: &str, raw: &str) -> Result<bool> {
                match key {
                    $( $key => {
                        self.$field = Some(media_kind!(@parse $ty, raw, key)?);
                        Ok(true)
                    }, )*
                    _ => Ok(false),
                }
            }

            /// Returns true if no field is set.
            #[must_use]
            pub const fn is_empty(&self) -> bool {
                $( self.$field.is_none() )&&*
            }

            /// Writes every set field as `<prefix><field> = <value>`.
            pub fn write_flat(&self, prefix: &str, out: &mut BTreeMap<String, String>) {
                $(
                    if let Some(v) = &self.$field {
                        out.insert(format!("{prefix}{}", $key), media_kind!(@render $ty, v));
                    }
                )*
            }
        }
    };
}

fn invalid(key: &str, cause: &dyn std::fmt::Display) -> Error {
    Error::BadRequest(format!("invalid value for '{key}': {cause}"))
}

media_kind! {
    /// Audio file metadata.
    Audio, "audio" {
        /// Album title.
        album: text => "album",
        /// Album artist.
        album_artist: text => "albumArtist",
        /// Performing artist.
        artist: text => "artist",
        /// Bitrate in kbps.
        bitrate: int => "bitrate",
        /// Composers.
        composers: text => "composers",
        /// Copyright notice.
        copyright: text => "copyright",
        /// Disc number.
        disc: int => "disc",
        /// Number of discs.
        disc_count: int => "discCount",
        /// Duration in milliseconds.
        duration: int => "duration",
        /// Genre.
        genre: text => "genre",
        /// Whether the file is DRM protected.
        has_drm: flag => "hasDrm",
        /// Whether the bitrate is variable.
        is_variable_bitrate: flag => "isVariableBitrate",
        /// Track title.
        title: text => "title",
        /// Track number.
        track: int => "track",
        /// Number of tracks.
        track_count: int => "trackCount",
        /// Release year.
        year: int => "year",
    }
}

media_kind! {
    /// Image dimensions.
    Image, "image" {
        /// Height in pixels.
        height: int => "height",
        /// Width in pixels.
        width: int => "width",
    }
}

media_kind! {
    /// Geographic location a file was captured at.
    GeoCoordinates, "location" {
        /// Altitude in meters.
        altitude: float => "altitude",
        /// Latitude in degrees.
        latitude: float => "latitude",
        /// Longitude in degrees.
        longitude: float => "longitude",
    }
}

media_kind! {
    /// Camera metadata of a photo.
    Photo, "photo" {
        /// Camera manufacturer.
        camera_make: text => "cameraMake",
        /// Camera model.
        camera_model: text => "cameraModel",
        /// Exposure time denominator.
        exposure_denominator: float => "exposureDenominator",
        /// Exposure time numerator.
        exposure_numerator: float => "exposureNumerator",
        /// Aperture f-number.
        f_number: float => "fNumber",
        /// Focal length in millimeters.
        focal_length: float => "focalLength",
        /// ISO sensitivity.
        iso: int => "iso",
        /// EXIF orientation.
        orientation: int => "orientation",
        /// When the photo was taken.
        taken_date_time: time => "takenDateTime",
    }
}

/// The kinds of media metadata a document can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// [`Audio`] metadata.
    Audio,
    /// [`Image`] metadata.
    Image,
    /// [`GeoCoordinates`] metadata.
    Location,
    /// [`Photo`] metadata.
    Photo,
}

impl MediaKind {
    /// All media kinds.
    pub const ALL: [Self; 4] = [Self::Audio, Self::Image, Self::Location, Self::Photo];

    /// Returns the kind name (`audio`, `image`, `location`, `photo`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => Audio::KIND,
            Self::Image => Image::KIND,
            Self::Location => GeoCoordinates::KIND,
            Self::Photo => Photo::KIND,
        }
    }

    /// Returns the flattened field names of this kind.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Audio => Audio::FIELDS,
            Self::Image => Image::FIELDS,
            Self::Location => GeoCoordinates::FIELDS,
            Self::Photo => Photo::FIELDS,
        }
    }

    /// Parses a kind name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }

    /// Resolves a `<kind>.<field>` name to its canonical kind and field.
    ///
    /// Matching is case-insensitive; the returned field name is canonical.
    #[must_use]
    pub fn resolve_field(name: &str) -> Option<(Self, &'static str)> {
        let (kind, field) = name.split_once('.')?;
        let kind = Self::parse(kind)?;
        kind.fields()
            .iter()
            .find(|f| f.eq_ignore_ascii_case(field))
            .map(|f| (kind, *f))
    }

    /// Returns the arbitrary metadata key prefix for this kind.
    #[must_use]
    pub fn storage_prefix(self) -> String {
        format!("{STORAGE_METADATA_PREFIX}{}.", self.as_str())
    }
}
