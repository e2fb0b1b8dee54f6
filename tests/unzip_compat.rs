use std::process::Command;

use tempfile::tempdir;

use rw_zip::{EntryOptions, FinishOptions, ZipWriter};

// Writes a ZIP with the library and then calls `unzip -t` to verify
// compatibility. Skipped when `unzip` is not on the system.

#[test]
fn unzip_compatibility() {
    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("compat.zip");

    {
        let mut writer = ZipWriter::create(&zip_path).unwrap();
        writer
            .add_buffer(b"hello from test", "hello.txt", &EntryOptions::default())
            .unwrap();
        writer
            .add_buffer(
                b"stored verbatim",
                "stored.txt",
                &EntryOptions {
                    compress: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        // a streamed entry exercises the data-descriptor path
        writer
            .add_read_stream(
                std::io::Cursor::new(vec![7u8; 256 * 1024]),
                "big.bin",
                &EntryOptions::default(),
            )
            .unwrap();
        writer
            .add_directory("nested", &EntryOptions::default())
            .unwrap();
        writer.finish(&FinishOptions::default()).unwrap();
    }

    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
}
