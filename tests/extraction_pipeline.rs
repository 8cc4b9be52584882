#![cfg(unix)]

use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};

use predicates::prelude::*;

struct Workspace {
    temp: tempfile::TempDir,
}

impl Workspace {
    fn new() -> anyhow::Result<Self> {
        let temp = tempfile::TempDir::new()?;
        std::fs::create_dir_all(temp.path().join("pdfs"))?;
        Ok(Self { temp })
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp.path().join(rel)
    }

    fn data_dir(&self) -> PathBuf {
        self.path("data")
    }

    /// A converter that copies `$FAKE_MARKDOWN` into the output dir. It fails
    /// for PDFs named `*broken*` or whenever `$FAKE_FAIL` is set, and hangs
    /// for PDFs named `*slow*`.
    fn fake_converter(&self) -> anyhow::Result<PathBuf> {
        let path = self.path("fake-marker.sh");
        std::fs::write(
            &path,
            r#"#!/bin/sh
if [ -n "$FAKE_FAIL" ]; then echo "converter crashed" >&2; exit 3; fi
case "$1" in
  *broken*) echo "could not open pdf" >&2; exit 2 ;;
  *slow*) sleep 30 ;;
esac
mkdir -p "$3/manual"
cp "$FAKE_MARKDOWN" "$3/manual/manual.md"
"#,
        )?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    fn manual_markdown(&self) -> anyhow::Result<PathBuf> {
        let body = "Check the tire pressure monthly and before long trips. \
Inflate the tires to the pressure shown on the door placard. "
            .repeat(12);
        let markdown = ["Safety", "Instruments", "Driving", "Maintenance", "Specifications"]
            .iter()
            .enumerate()
            .map(|(idx, title)| format!("# {title}\n{body}\n## Part {idx}\n{body}\n"))
            .collect::<String>();
        let path = self.path("manual.md");
        std::fs::write(&path, markdown)?;
        Ok(path)
    }

    fn catalog(&self, ids: &[&str]) -> anyhow::Result<PathBuf> {
        let mut lines = String::new();
        for (idx, id) in ids.iter().enumerate() {
            let pdf = self.path(&format!("pdfs/{id}.pdf"));
            std::fs::write(&pdf, "%PDF-1.7")?;
            let record = serde_json::json!({
                "id": id,
                "year": 2020 + idx,
                "make": "Toyota",
                "model": "Camry",
                "source": pdf.to_string_lossy(),
            });
            lines.push_str(&record.to_string());
            lines.push('\n');
        }
        let path = self.path("catalog.jsonl");
        std::fs::write(&path, lines)?;
        Ok(path)
    }

    fn cmd(&self) -> anyhow::Result<assert_cmd::Command> {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("manual-extractor");
        cmd.env("MANUAL_EXTRACTOR_DATA_DIR", self.data_dir())
            .env("MANUAL_EXTRACTOR_CONVERTER_BIN", self.fake_converter()?)
            .env("MANUAL_EXTRACTOR_MIN_CONTENT_CHARS", "1000")
            .env("FAKE_MARKDOWN", self.manual_markdown()?)
            .env("RUST_LOG", "warn");
        Ok(cmd)
    }

    fn document(&self, id: &str) -> anyhow::Result<serde_json::Value> {
        let raw = std::fs::read_to_string(self.document_dir(id).join("document.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn document_dir(&self, id: &str) -> PathBuf {
        self.data_dir().join("documents").join(id)
    }
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn import_extract_and_status() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["camry-2020", "broken-2021"])?;

    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 documents (0 already present)"));

    ws.cmd()?
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending     2"));

    ws.cmd()?
        .args(["extract", "--limit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK]   2020 Toyota Camry (camry-2020)"))
        .stdout(predicate::str::contains("[FAIL] 2021 Toyota Camry (broken-2021)"))
        .stdout(predicate::str::contains("1 succeeded, 1 failed"));

    let camry = ws.document("camry-2020")?;
    assert_eq!(camry["content_status"], "extracted");
    assert!(ws.document_dir("camry-2020").join("content.json").exists());
    let sections: Vec<serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(
        ws.document_dir("camry-2020").join("sections.json"),
    )?)?;
    assert_eq!(sections.len(), 10);

    let broken = ws.document("broken-2021")?;
    assert_eq!(broken["content_status"], "failed");
    assert!(
        broken["error_message"]
            .as_str()
            .unwrap_or_default()
            .contains("could not open pdf")
    );

    ws.cmd()?
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("extracted   1"))
        .stdout(predicate::str::contains("failed      1"));

    ws.cmd()?
        .args(["extract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no pending documents"));
    Ok(())
}

#[test]
fn converter_timeout_fails_the_document() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["slow-2019"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();

    ws.cmd()?
        .env("MANUAL_EXTRACTOR_CONVERTER_TIMEOUT_SECS", "1")
        .args(["extract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout"));

    let slow = ws.document("slow-2019")?;
    assert_eq!(slow["content_status"], "failed");
    assert!(
        slow["error_message"]
            .as_str()
            .unwrap_or_default()
            .contains("timeout")
    );
    Ok(())
}

#[test]
fn batch_mode_runs_on_the_worker_pool() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["a-2020", "b-2021", "c-2022"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();

    ws.cmd()?
        .args(["extract", "--batch", "2", "--workers", "2", "--continuous"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 succeeded, 0 failed"));

    for id in ["a-2020", "b-2021", "c-2022"] {
        assert_eq!(ws.document(id)?["content_status"], "extracted");
    }
    Ok(())
}

#[test]
fn watchdog_once_resets_stuck_extractions() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["stuck-2018"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();

    let path = ws.document_dir("stuck-2018").join("document.json");
    let mut doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    doc["content_status"] = "extracting".into();
    doc["claimed_at"] = "2020-01-01T00:00:00Z".into();
    std::fs::write(&path, serde_json::to_string(&doc)?)?;

    ws.cmd()?
        .args(["watchdog", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reset 2020 Toyota Camry (stuck-2018)"))
        .stdout(predicate::str::contains("pending     1"));

    assert_eq!(ws.document("stuck-2018")?["content_status"], "pending");
    Ok(())
}

#[test]
fn watchdog_gives_up_on_exhausted_claims() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["poison-2018"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();

    let path = ws.document_dir("poison-2018").join("document.json");
    let mut doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    doc["content_status"] = "extracting".into();
    doc["claimed_at"] = "2020-01-01T00:00:00Z".into();
    doc["attempts"] = 3.into();
    std::fs::write(&path, serde_json::to_string(&doc)?)?;

    ws.cmd()?
        .args(["watchdog", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gave up on 2020 Toyota Camry (poison-2018)"))
        .stdout(predicate::str::contains("failed      1"));

    let doc = ws.document("poison-2018")?;
    assert_eq!(doc["content_status"], "failed");
    assert!(
        doc["error_message"]
            .as_str()
            .unwrap_or_default()
            .contains("attempts exhausted")
    );
    Ok(())
}

#[test]
fn requeue_recovers_documents_out_of_attempts() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["flaky-2020"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();

    ws.cmd()?
        .env("FAKE_FAIL", "1")
        .env("MANUAL_EXTRACTOR_MAX_ATTEMPTS", "1")
        .args(["extract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[FAIL] 2020 Toyota Camry (flaky-2020)"));

    // One attempt allowed and used up: nothing is claimable anymore.
    ws.cmd()?
        .env("MANUAL_EXTRACTOR_MAX_ATTEMPTS", "1")
        .env("MANUAL_EXTRACTOR_RETRY_BACKOFF_SECS", "1")
        .args(["extract", "--batch", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no pending documents"));
    assert_eq!(ws.document("flaky-2020")?["content_status"], "failed");

    ws.cmd()?
        .args(["requeue", "--status", "failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("requeued flaky-2020"))
        .stdout(predicate::str::contains("requeued 1 of 1 documents"));
    let doc = ws.document("flaky-2020")?;
    assert_eq!(doc["content_status"], "pending");
    assert_eq!(doc["attempts"], 0);

    ws.cmd()?
        .env("MANUAL_EXTRACTOR_MAX_ATTEMPTS", "1")
        .args(["extract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK]   2020 Toyota Camry (flaky-2020)"));
    assert_eq!(ws.document("flaky-2020")?["content_status"], "extracted");

    ws.cmd()?
        .args(["requeue", "--id", "flaky-2020", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("requeued 1 of 1 documents"));
    assert!(!ws.document_dir("flaky-2020").join("content.json").exists());
    Ok(())
}

#[test]
fn audit_fix_requeues_low_quality_extractions() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["thin-2020"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();

    // Long enough for the length gate, but headingless and letter-spaced.
    let thin = ws.path("thin.md");
    std::fs::write(&thin, "t h i s i s s p a c e d ".repeat(60))?;
    ws.cmd()?
        .env("FAKE_MARKDOWN", &thin)
        .args(["extract"])
        .assert()
        .success()
        .stdout(predicate::str::contains("below quality bar"));
    assert_eq!(ws.document("thin-2020")?["content_status"], "extracted");

    ws.cmd()?
        .args(["audit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("FAIL 2020 Toyota Camry (thin-2020)"))
        .stdout(predicate::str::contains("0 passed, 1 failed"));
    assert_eq!(ws.document("thin-2020")?["content_status"], "extracted");

    ws.cmd()?
        .args(["audit", "--fix", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("requeued 1 documents"));
    assert_eq!(ws.document("thin-2020")?["content_status"], "pending");
    assert!(!ws.document_dir("thin-2020").join("content.json").exists());
    Ok(())
}

#[test]
fn backfill_regenerates_missing_sections() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let catalog = ws.catalog(&["camry-2020"])?;
    ws.cmd()?
        .args(["import", "--catalog", &arg(&catalog)])
        .assert()
        .success();
    ws.cmd()?.args(["extract"]).assert().success();

    std::fs::remove_file(ws.document_dir("camry-2020").join("sections.json"))?;

    ws.cmd()?
        .args(["backfill"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[DONE] 2020 Toyota Camry: 10 sections"));

    ws.cmd()?
        .args(["backfill"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already has 10 sections"));
    Ok(())
}
