//! On-disk DOS structures: directory entries, file name syntax, directory
//! search and the `$` listing.

mod dir_entry;
mod directory;
mod filename;
mod listing;

pub use dir_entry::{
    matches, offset, type_name, DirEntry, FileType, CLOSED, ENTRIES_PER_BLOCK, ENTRY_SIZE, LOCKED,
    NAME_LENGTH, PAD,
};
pub use directory::{DirSearch, DirSlot};
pub use filename::{FileMode, FileSpec};
pub use listing::{build_listing, decode_listing, listing_pattern, ListingLine};
