//! Domain model shared by every packsmith crate.
//!
//! Packages (sticker packs) own stickers; both are persisted by the content
//! store and referenced by bare image file names inside one asset directory.

mod assets;
mod error;
mod integrity;
mod model;
mod whitelist;

pub use assets::{
    mime_type_for, validate_asset_name, AssetDir, FALLBACK_MIME_TYPE, STICKER_EXTENSION,
    STICKER_MIME_TYPE,
};
pub use error::{PacksmithError, Result};
pub use integrity::{hash_bytes, hash_file, try_hash_file};
pub use model::{
    normalize_emojis, NewPackage, NewSticker, Package, PackageWithStickers, Sticker, CANVAS_SIZE,
    INITIAL_IMAGE_DATA_VERSION, MAX_DISPLAY_TEXT_CHARS, MAX_STICKERS_PER_PACK,
};
pub use whitelist::{MemoryWhitelist, NoWhitelist, WhitelistRegistry};
