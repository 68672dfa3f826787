//! Format classification from a URL suffix.

use std::fmt;

/// Format family inferred from the text after the final `.` of a URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionClass {
    Unknown,
    Mp3,
    Flac,
    Opus,
    Ogg,
    Wav,
    /// AAC family: raw ADTS and MP4/M4A containers.
    Aac,
}

impl ExtensionClass {
    /// Every class that has a decoder, in registry construction order.
    pub const SUPPORTED: [ExtensionClass; 6] = [
        ExtensionClass::Mp3,
        ExtensionClass::Flac,
        ExtensionClass::Opus,
        ExtensionClass::Ogg,
        ExtensionClass::Wav,
        ExtensionClass::Aac,
    ];

    /// Classify `url` by its last `.`-delimited suffix, ignoring ASCII case.
    ///
    /// A URL without a `.`, or whose only `.` is the first character, is `Unknown`.
    /// The suffix is taken over the whole URL, so a dot inside a directory name
    /// followed by a dotless file name yields a suffix containing `/`, which never
    /// matches a known extension.
    pub fn classify(url: &str) -> Self {
        match url.rfind('.') {
            None | Some(0) => ExtensionClass::Unknown,
            Some(pos) => Self::from_extension(&url[pos + 1..]),
        }
    }

    /// Map a bare extension (no leading dot) to its class.
    pub fn from_extension(ext: &str) -> Self {
        const TABLE: &[(&str, ExtensionClass)] = &[
            ("mp3", ExtensionClass::Mp3),
            ("flac", ExtensionClass::Flac),
            ("opus", ExtensionClass::Opus),
            ("ogg", ExtensionClass::Ogg),
            ("oga", ExtensionClass::Ogg),
            ("wav", ExtensionClass::Wav),
            ("aac", ExtensionClass::Aac),
            ("m4a", ExtensionClass::Aac),
            ("mp4", ExtensionClass::Aac),
        ];
        TABLE
            .iter()
            .find(|(name, _)| ext.eq_ignore_ascii_case(name))
            .map(|(_, class)| *class)
            .unwrap_or(ExtensionClass::Unknown)
    }

    pub fn is_known(self) -> bool {
        self != ExtensionClass::Unknown
    }

    /// Extension handed to the demuxer probe as a format hint.
    pub fn probe_hint(self) -> Option<&'static str> {
        match self {
            ExtensionClass::Unknown => None,
            ExtensionClass::Mp3 => Some("mp3"),
            ExtensionClass::Flac => Some("flac"),
            ExtensionClass::Opus => Some("opus"),
            ExtensionClass::Ogg => Some("ogg"),
            ExtensionClass::Wav => Some("wav"),
            ExtensionClass::Aac => Some("m4a"),
        }
    }
}

impl fmt::Display for ExtensionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExtensionClass::Unknown => "unknown",
            ExtensionClass::Mp3 => "mp3",
            ExtensionClass::Flac => "flac",
            ExtensionClass::Opus => "opus",
            ExtensionClass::Ogg => "ogg",
            ExtensionClass::Wav => "wav",
            ExtensionClass::Aac => "aac",
        };
        f.write_str(label)
    }
}
