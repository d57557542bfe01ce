use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use analyzer_core::model::{
    AnalysisRef, AnalyzerTask, EvidenceRef, ExecutionResult, OperatingSystem, Priority,
};
use analyzer_core::{Analyzer, Storage};
use analyzer_plugins::config::{HayabusaConfig, PlasmaConfig};
use analyzer_plugins::{Config, Registry};
use tempfile::{tempdir, TempDir};
use uuid::Uuid;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn task(storage: &Storage, analyzer: &str, tags: &[&str], hostname: Option<&str>) -> AnalyzerTask {
    let task = AnalyzerTask {
        collection: EvidenceRef {
            case_id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            hostname: hostname.map(String::from),
            opsystem: Some(OperatingSystem::Windows),
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            collected_at_ms: None,
        },
        analysis: AnalysisRef {
            analyzer: analyzer.into(),
            priority: Priority::High,
        },
    };
    let input = storage.collection_storage(task.case_id(), task.collection_id());
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("Security.evtx"), b"evtx").unwrap();
    task
}

fn zip_names(path: &Path) -> Vec<String> {
    let zip = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = zip.file_names().map(String::from).collect();
    names.sort();
    names
}

struct Setup {
    _tmp: TempDir,
    storage: Storage,
    registry: Registry,
}

fn setup() -> Setup {
    let tmp = tempdir().unwrap();
    let tools = tmp.path().join("tools");
    fs::create_dir_all(tools.join("rules")).unwrap();

    // Writes the name of every -o / -H target into that file.
    let hayabusa = script(
        &tools,
        "hayabusa",
        r#"sub="$1"
while [ $# -gt 0 ]; do
  case "$1" in -o|-H) echo "$sub" > "$2" ;; esac
  shift
done
echo "$sub done""#,
    );
    // Args: dissect .. --filter(7) tags:..(8) .. .(13) <scratch>(14)
    let plasma = script(
        &tools,
        "plasma",
        r#"echo "$8" > "${14}/filter.txt"
ls > "${14}/listing.txt"
echo "dissected $6" >> "$PLASMA_LOGFILE""#,
    );

    let mut config = Config::with_storage_root(tmp.path().join("storage"));
    config.analyzers.hayabusa = Some(HayabusaConfig {
        program: hayabusa,
        rules_dir: tools.join("rules"),
    });
    config.analyzers.plasma = Some(PlasmaConfig {
        program: plasma,
        parallel_surgeons: 1,
        parallel_dissectors: 1,
        tags: vec!["windows".into(), "linux".into()],
    });
    config.validate().unwrap();

    Setup {
        storage: Storage::new(&config.storage.root),
        registry: Registry::from_config(&config),
        _tmp: tmp,
    }
}

#[test]
fn registry_lists_configured_analyzers() {
    let s = setup();
    let names: Vec<_> = s.registry.names().collect();
    assert_eq!(names, ["extractor", "hayabusa", "plasma"]);
    assert!(s.registry.get("plaso").is_none());

    let descriptors = s.registry.descriptors();
    let plasma = descriptors.iter().find(|d| d.name == "plasma").unwrap();
    assert!(plasma.requires_host);
    assert_eq!(
        plasma.tags.iter().map(String::as_str).collect::<Vec<_>>(),
        ["linux", "windows"]
    );
}

#[test]
fn storage_only_config_still_offers_the_extractor() {
    let registry = Registry::from_config(&Config::with_storage_root("/srv/evidence"));
    assert_eq!(registry.len(), 1);
    assert!(registry.get("extractor").is_some());
}

#[tokio::test]
async fn hayabusa_runs_every_step_and_archives_outputs() {
    let s = setup();
    let task = task(&s.storage, "hayabusa", &["evtx"], None);
    let paths = s.storage.resolve(task.case_id(), task.collection_id(), "hayabusa");
    let analyzer = s.registry.get("hayabusa").unwrap();

    let result = analyzer.execute(&s.storage, &task).await;

    let ExecutionResult::Succeeded { archive_path } = result else {
        panic!("hayabusa failed: {result:?}");
    };
    assert_eq!(
        zip_names(&archive_path),
        [
            "computer-metrics.csv",
            "eid-metrics.csv",
            "extract-base64.csv",
            "log-metrics.csv",
            "logon-summary.csv",
            "summary.html",
            "timeline.csv",
        ]
    );
    let log = fs::read_to_string(&paths.log_path).unwrap();
    assert!(log.contains("[6/6] csv-timeline"));
    assert!(log.contains("computer-metrics done"));
    assert!(!paths.scratch_dir.exists());
}

#[tokio::test]
async fn plasma_runs_in_the_evidence_directory_and_logs_through_env() {
    let s = setup();
    let task = task(&s.storage, "plasma", &["memory"], Some("WS-042"));
    let paths = s.storage.resolve(task.case_id(), task.collection_id(), "plasma");
    let analyzer = s.registry.get("plasma").unwrap();

    let result = analyzer.execute(&s.storage, &task).await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(zip_names(&paths.archive_path), ["filter.txt", "listing.txt"]);
    let archive = fs::File::open(&paths.archive_path).unwrap();
    let mut zip = zip::ZipArchive::new(archive).unwrap();
    let mut listing = String::new();
    std::io::Read::read_to_string(&mut zip.by_name("listing.txt").unwrap(), &mut listing).unwrap();
    assert_eq!(listing.trim(), "Security.evtx");
    let mut filter = String::new();
    std::io::Read::read_to_string(&mut zip.by_name("filter.txt").unwrap(), &mut filter).unwrap();
    assert_eq!(filter.trim(), "tags:windows");

    let log = fs::read_to_string(&paths.log_path).unwrap();
    assert!(log.contains("dissected WS-042"));
}

#[tokio::test]
async fn plasma_without_hostname_never_stages() {
    let s = setup();
    let task = task(&s.storage, "plasma", &["windows"], None);
    let analysis_dir = s
        .storage
        .analysis_storage(task.case_id(), task.collection_id(), "plasma");

    let result = s.registry.get("plasma").unwrap().execute(&s.storage, &task).await;

    assert_eq!(result.error().map(|e| e.kind()), Some("precondition"));
    assert!(!analysis_dir.exists());
}
