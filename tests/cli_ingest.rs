mod common;

use std::fs;

use common::{EpubFixture, PIXEL_PNG};
use novel_reader::formats::{Chapter, ImageAsset, NovelRecord};
use predicates::prelude::*;

fn sample_epub(dir: &std::path::Path) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join("long-road.epub");
    EpubFixture::new()
        .title("The Long Road")
        .author("A. Writer")
        .chapter("ch1.xhtml", "<h1>Departure</h1><p>They left.</p>")
        .chapter(
            "ch2.xhtml",
            r#"<p>Map below.</p><img src="../Images/map.png" alt="Map"/>"#,
        )
        .image("map.png", PIXEL_PNG)
        .write_to(&path)?;
    Ok(path)
}

#[test]
fn ingest_writes_record_chapters_and_images() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let epub = sample_epub(temp.path())?;
    let out = temp.path().join("out");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novel-reader");
    cmd.arg("ingest")
        .arg("--epub")
        .arg(&epub)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("The Long Road by A. Writer: 2 chapters, 1 images"));

    let novel: NovelRecord = serde_json::from_slice(&fs::read(out.join("novel.json"))?)?;
    assert_eq!(novel.chapter_count, 2);
    assert!(novel.has_images);

    let chapters = fs::read_to_string(out.join("chapters.jsonl"))?
        .lines()
        .map(serde_json::from_str::<Chapter>)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].title, "Departure");

    let images = fs::read_to_string(out.join("images.jsonl"))?
        .lines()
        .map(serde_json::from_str::<ImageAsset>)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(images.len(), 1);
    assert_eq!(chapters[1].images, vec![images[0].id.clone()]);
    assert_eq!(images[0].decode_payload()?, PIXEL_PNG);
    Ok(())
}

#[test]
fn ingest_refuses_existing_output_dir() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let epub = sample_epub(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novel-reader");
    cmd.arg("ingest")
        .arg("--epub")
        .arg(&epub)
        .arg("--out")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn ingest_reports_malformed_package() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let epub = temp.path().join("broken.epub");
    fs::write(&epub, b"not a zip at all")?;
    let out = temp.path().join("out");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novel-reader");
    cmd.arg("ingest")
        .arg("--epub")
        .arg(&epub)
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed package"));
    assert!(!out.exists());
    Ok(())
}

#[test]
fn import_stores_novel_for_the_app() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let epub = sample_epub(temp.path())?;
    let data_dir = temp.path().join("data");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novel-reader");
    let output = cmd
        .arg("import")
        .arg("--epub")
        .arg(&epub)
        .arg("--data-dir")
        .arg(&data_dir)
        .output()?;
    assert!(output.status.success(), "{output:?}");
    let id = String::from_utf8(output.stdout)?.trim().to_owned();
    assert!(uuid::Uuid::parse_str(&id).is_ok(), "{id}");

    let novel_dir = data_dir.join("novels").join(&id);
    assert!(novel_dir.join("novel.json").is_file());
    assert!(novel_dir.join("chapters").join("2.json").is_file());

    // a second import resolves to the same stored novel
    let mut again = assert_cmd::cargo::cargo_bin_cmd!("novel-reader");
    again
        .arg("import")
        .arg("--epub")
        .arg(&epub)
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(format!("{id}\n"));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let epub = sample_epub(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("novel-reader");
    cmd.env("RUST_LOG", "debug")
        .arg("ingest")
        .arg("--epub")
        .arg(&epub)
        .arg("--out")
        .arg(temp.path().join("out"))
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
