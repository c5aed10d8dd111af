//! par2cmdline transcripts and scratch directory helpers

use std::fs;
use std::path::{Path, PathBuf};

/// `par2 v` on an intact two-file set (exit code 0)
pub const VERIFY_INTACT: &str = r#"par2cmdline version 0.8.1, Copyright (C) 2003-2019 Peter Brian Clements.

Loading "AlbumX.par2".
Loaded 6 new packets
Loading "AlbumX.vol0+1.par2".
Loaded 1 new packets including 1 recovery blocks

There are 2 recoverable files and 0 other files.
The block size used was 4096 bytes.
There are a total of 40 data blocks.
The total size of the data files is 163840 bytes.

Verifying source files:

Opening: "01 - Intro.flac"
Target: "01 - Intro.flac" - found.
Opening: "02 - Song.flac"
Target: "02 - Song.flac" - found.

All files are correct, repair is not required.
"#;

/// `par2 v` with one missing and one damaged file (exit code 1)
pub const VERIFY_DAMAGED: &str = r#"Loading "AlbumY.par2".
Loaded 8 new packets
There are 3 recoverable files and 0 other files.
The block size used was 4096 bytes.

Verifying source files:

Opening: "01 - Intro.flac"
Target: "01 - Intro.flac" - found.
Target: "02 - Song.flac" - missing.
Opening: "03 - Outro.flac"
Target: "03 - Outro.flac" - damaged. Found 9 of 10 data blocks.

Scanning extra files:


Repair is required.
1 file(s) exist but are damaged.
1 file(s) are missing.
1 file(s) are ok.
You have 19 out of 30 data blocks available.
You have 12 recovery blocks available.
Repair is possible.
You have an excess of 1 recovery blocks.
11 recovery blocks will be used to repair.
"#;

/// `par2 r` that rebuilds a missing file (exit code 0)
pub const REPAIR_SUCCESS: &str = r#"Loading "AlbumY.par2".
Loaded 8 new packets
There are 2 recoverable files and 0 other files.

Verifying source files:

Target: "01 - Intro.flac" - found.
Target: "02 - Song.flac" - missing.

Repair is required.
1 file(s) are missing.
1 file(s) are ok.
You have 10 out of 20 data blocks available.
You have 12 recovery blocks available.
Repair is possible.
You have an excess of 2 recovery blocks.
10 recovery blocks will be used to repair.

Computing Reed Solomon matrix.
Constructing: done.
Solving: done.

Wrote 40960 bytes to disk

Verifying repaired files:

Opening: "02 - Song.flac"
Target: "02 - Song.flac" - found.

Repair complete.
"#;

/// `par2 r` without enough recovery blocks (exit code 2)
pub const REPAIR_INSUFFICIENT: &str = r#"Loading "AlbumZ.par2".
Loaded 8 new packets
There are 2 recoverable files and 0 other files.

Verifying source files:

Target: "01 - Intro.flac" - missing.
Target: "02 - Song.flac" - missing.

Repair is required.
2 file(s) are missing.
You have 0 out of 20 data blocks available.
You have 2 recovery blocks available.
Repair is not possible.
You need 18 more recovery blocks to be able to repair.
"#;

/// `par2 c` output (exit code 0)
pub const CREATE_SUCCESS: &str = r#"Block size: 4096
Source file count: 2
Source block count: 40
Redundancy: 10%
Recovery block count: 4
Recovery file count: 3

Opening: 01 - Intro.flac
Opening: 02 - Song.flac
Computing Reed Solomon matrix.
Constructing: done.
Wrote 16384 bytes to disk
Writing recovery packets
Writing verification packets
Done
"#;

/// Lines of a transcript, as the runner would deliver them
pub fn lines(transcript: &str) -> Vec<String> {
    transcript.lines().map(str::to_string).collect()
}

/// Create `dir/name` with some content, creating parents as needed
pub fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, name.as_bytes()).expect("Failed to write test file");
    path
}

/// Create a folder holding a few audio-like files
pub fn album(root: &Path, name: &str, tracks: &[&str]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("Failed to create album folder");
    for track in tracks {
        touch(&dir, track);
    }
    dir
}
