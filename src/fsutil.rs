//! Local filesystem helpers for transfer pre-computation

use std::path::Path;

/// Walk a local directory and return its exact byte and file counts.
///
/// Used to pre-compute transfer totals when the source side is local;
/// cloud-side directories fall back to the backend-reported size since an
/// exact recursive count would cost extra listing calls. Hidden files are
/// included and ignore files are not honored: the transfer copies
/// everything, so the totals must count everything.
pub fn folder_size_and_count(path: &Path) -> (u64, u64) {
	let mut bytes = 0u64;
	let mut files = 0u64;
	let walker = ignore::WalkBuilder::new(path)
		.standard_filters(false)
		.hidden(false)
		.follow_links(false)
		.build();
	for entry in walker.flatten() {
		let Ok(metadata) = entry.metadata() else { continue };
		if metadata.is_file() {
			files += 1;
			bytes += metadata.len();
		}
	}
	(bytes, files)
}


// vim: ts=4
