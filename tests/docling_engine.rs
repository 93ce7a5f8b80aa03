#![cfg(unix)]

use docling_batch::{
    classify::{Classifier, FailureKind},
    config::Config,
    engine::{docling::DoclingCli, ConvertError, ConvertIn, Engine},
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// Writing an executable while another test thread forks can make exec fail
// with ETXTBSY, so the tests in this file run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

/// Stand-in for `docling`: records its arguments, then writes `<stem>.md`
/// into the `--output` folder.
const CONVERTS: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "Docling version: 2.31.0"
  exit 0
fi
printf '%s\n' "$@" > "$ARGS_FILE"
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--output" ]; then out="$a"; fi
  prev="$a"
done
stem=$(basename "$1")
stem="${stem%.*}"
printf '# %s\n\nbody\n' "$stem" > "$out/$stem.md"
"#;

const CUDA_CRASH: &str = r#"#!/bin/sh
echo "loading models" >&2
echo "RuntimeError: CUDA error: out of memory" >&2
exit 1
"#;

const NO_OUTPUT: &str = "#!/bin/sh\nexit 0\n";

// `sleep` is a grandchild that keeps the stdio pipes open after the shell is killed.
const HANGS: &str = "#!/bin/sh\nsleep 5\necho done\n";

fn fake_docling(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("docling");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn engine_config(exe: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.docling.exe = exe.display().to_string();
    cfg.docling.convert_timeout_seconds = 30;
    cfg
}

fn request(dir: &Path, name: &str, device: &str) -> ConvertIn {
    let input = dir.join(name);
    std::fs::write(&input, b"x").unwrap();
    ConvertIn {
        input,
        device: device.into(),
    }
}

#[test]
fn converts_and_reads_back_markdown() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_docling(dir.path(), CONVERTS);
    let args_file = dir.path().join("args.txt");

    let mut cfg = engine_config(&exe);
    cfg.docling.do_ocr = false;
    cfg.docling.pdf_backend = "dlparse_v4".into();
    cfg.docling.num_threads = 4;
    cfg.docling.extra_args = vec!["--verbose".into()];
    cfg.docling
        .env
        .insert("ARGS_FILE".into(), args_file.display().to_string());

    let engine = DoclingCli::new(&cfg);
    let out = engine
        .convert(&request(dir.path(), "Annual Report.pdf", "CUDA"))
        .unwrap();
    assert_eq!(out.markdown, "# Annual Report\n\nbody\n");
    assert!(out.warnings.is_empty());

    let args: Vec<String> = std::fs::read_to_string(&args_file)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert!(args[0].ends_with("Annual Report.pdf"));
    assert_eq!(&args[1..3], ["--to", "md"]);
    assert_eq!(args[3], "--output");
    assert_eq!(args[5], "--abort-on-error");
    let tail = &args[6..];
    assert_eq!(
        tail,
        [
            "--device",
            "cuda",
            "--no-ocr",
            "--pdf-backend",
            "dlparse_v4",
            "--num-threads",
            "4",
            "--verbose"
        ]
    );
    // Scratch output folder is gone once the Markdown has been read.
    assert!(!Path::new(&args[4]).exists());
}

#[test]
fn auto_device_passes_no_device_flag() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_docling(dir.path(), CONVERTS);
    let args_file = dir.path().join("args.txt");

    let mut cfg = engine_config(&exe);
    cfg.docling
        .env
        .insert("ARGS_FILE".into(), args_file.display().to_string());

    DoclingCli::new(&cfg)
        .convert(&request(dir.path(), "notes.docx", "auto"))
        .unwrap();
    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(!args.lines().any(|l| l == "--device"));
    assert!(args.lines().any(|l| l == "--ocr"));
}

#[test]
fn stderr_tail_becomes_a_gpu_failure() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_docling(dir.path(), CUDA_CRASH);
    let cfg = engine_config(&exe);

    let err = DoclingCli::new(&cfg)
        .convert(&request(dir.path(), "scan.pdf", "cuda"))
        .unwrap_err();
    assert_eq!(
        err,
        ConvertError::Conversion(
            "loading models\nRuntimeError: CUDA error: out of memory".into()
        )
    );

    let classified = Classifier::new(&cfg).unwrap().classify_convert(&err);
    assert_eq!(classified.kind, FailureKind::Gpu);
}

#[test]
fn missing_markdown_is_an_export_error() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_docling(dir.path(), NO_OUTPUT);

    let err = DoclingCli::new(&engine_config(&exe))
        .convert(&request(dir.path(), "slides.pptx", "cpu"))
        .unwrap_err();
    match err {
        ConvertError::Export(msg) => {
            assert!(msg.contains("docling produced no markdown"), "{msg}");
            assert!(msg.contains("slides.md"), "{msg}");
        }
        other => panic!("expected export error, got {other:?}"),
    }
}

#[test]
fn timeout_is_bounded_even_when_pipes_stay_open() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_docling(dir.path(), HANGS);
    let mut cfg = engine_config(&exe);
    cfg.docling.convert_timeout_seconds = 1;

    let started = Instant::now();
    let err = DoclingCli::new(&cfg)
        .convert(&request(dir.path(), "slow.pdf", "cpu"))
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ConvertError::Timeout(_)), "{err:?}");
    assert!(err.to_string().starts_with("docling exceeded timeout (1s)"));
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
}

#[test]
fn doctor_reports_version_and_missing_binary() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let exe = fake_docling(dir.path(), CONVERTS);

    let diag = DoclingCli::new(&engine_config(&exe)).doctor().unwrap();
    assert!(diag.ok);
    assert_eq!(diag.docling_version.as_deref(), Some("2.31.0"));

    let missing = engine_config(&dir.path().join("not-installed"));
    let diag = DoclingCli::new(&missing).doctor().unwrap();
    assert!(!diag.ok);
    assert!(diag.error.is_some());
}
