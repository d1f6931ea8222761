use packsmith_core::mime_type_for;

pub const DEFAULT_AUTHORITY: &str = "packsmith.stickercontentprovider";

pub const METADATA_PATH: &str = "metadata";
pub const STICKERS_PATH: &str = "stickers";
pub const STICKERS_ASSET_PATH: &str = "stickers_asset";

const CONTENT_SCHEME: &str = "content://";

/// One of the four shapes an external caller may ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRoute {
    Metadata,
    MetadataById(String),
    Stickers(String),
    StickerAsset { identifier: String, file_name: String },
}

impl QueryRoute {
    /// Parse `content://<authority>/<path>` or a bare `/<path>`.
    ///
    /// Everything after `stickers_asset/<identifier>/` is taken as the file
    /// name, unsplit, so separators inside it reach asset-name validation.
    #[must_use]
    pub fn parse(uri: &str, authority: &str) -> Option<Self> {
        let path = match uri.strip_prefix(CONTENT_SCHEME) {
            Some(rest) => {
                let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
                if host != authority {
                    return None;
                }
                path
            }
            None => uri,
        };
        let path = path.trim_start_matches('/');

        let (head, tail) = path.split_once('/').unwrap_or((path, ""));
        match head {
            METADATA_PATH if tail.is_empty() => Some(Self::Metadata),
            METADATA_PATH => single_segment(tail).map(Self::MetadataById),
            STICKERS_PATH => single_segment(tail).map(Self::Stickers),
            STICKERS_ASSET_PATH => {
                let (identifier, file_name) = tail.split_once('/')?;
                if identifier.is_empty() {
                    return None;
                }
                Some(Self::StickerAsset {
                    identifier: identifier.to_string(),
                    file_name: file_name.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Provider-style content type for this route.
    #[must_use]
    pub fn content_type(&self, authority: &str) -> String {
        match self {
            Self::Metadata => format!("vnd.android.cursor.dir/vnd.{authority}.{METADATA_PATH}"),
            Self::MetadataById(_) => {
                format!("vnd.android.cursor.item/vnd.{authority}.{METADATA_PATH}")
            }
            Self::Stickers(_) => format!("vnd.android.cursor.dir/vnd.{authority}.{STICKERS_PATH}"),
            Self::StickerAsset { file_name, .. } => mime_type_for(file_name).to_string(),
        }
    }
}

fn single_segment(tail: &str) -> Option<String> {
    let segment = tail.trim_end_matches('/');
    if segment.is_empty() || segment.contains('/') {
        None
    } else {
        Some(segment.to_string())
    }
}
