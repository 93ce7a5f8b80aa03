use docling_batch::{
    config::Config,
    doctor::{check_environment, parse_nvidia_smi, resolve_device, EnvReport, GpuInfo},
    engine::{docling::parse_version, ConvertError, ConvertIn, ConvertOut, DocDiag, Engine},
};

struct MissingDocling;

impl Engine for MissingDocling {
    fn doctor(&self) -> anyhow::Result<DocDiag> {
        Ok(DocDiag {
            docling_exe: "docling".into(),
            docling_version: None,
            ok: false,
            error: Some("No such file or directory".into()),
        })
    }

    fn convert(&self, _req: &ConvertIn) -> Result<ConvertOut, ConvertError> {
        Err(ConvertError::Conversion("unreachable".into()))
    }
}

fn diag() -> DocDiag {
    DocDiag {
        docling_exe: "docling".into(),
        docling_version: Some("2.31.0".into()),
        ok: true,
        error: None,
    }
}

#[test]
fn parses_nvidia_smi_rows() {
    let out = "NVIDIA GeForce RTX 4090, 24564, 550.54.14\nTesla T4, 15360, 535.104.05\n\n";
    let gpus = parse_nvidia_smi(out);
    assert_eq!(gpus.len(), 2);
    assert_eq!(gpus[0].name, "NVIDIA GeForce RTX 4090");
    assert!((gpus[0].vram_gib - 23.99).abs() < 0.01);
    assert_eq!(gpus[1].driver_version, "535.104.05");

    assert!(parse_nvidia_smi("No devices were found").is_empty());
}

#[test]
fn device_resolution() {
    assert_eq!(resolve_device("auto", true), "cuda");
    assert_eq!(resolve_device("AUTO", false), "cpu");
    assert_eq!(resolve_device("", false), "cpu");
    assert_eq!(resolve_device("MPS", false), "mps");
}

#[test]
fn cpu_fallback_carries_hints() {
    let cfg = Config::default();
    let report = EnvReport::build(&cfg, diag(), Vec::new());
    assert_eq!(report.resolved_device, "cpu");
    assert!(report.hints.iter().any(|h| h.contains("nvidia-smi")));

    let gpu = GpuInfo {
        name: "Tesla T4".into(),
        vram_gib: 15.0,
        driver_version: "535".into(),
    };
    let report = EnvReport::build(&cfg, diag(), vec![gpu]);
    assert_eq!(report.resolved_device, "cuda");
    assert!(report.hints.is_empty());
}

#[test]
fn missing_docling_aborts() {
    let err = check_environment(&Config::default(), &MissingDocling).unwrap_err();
    assert!(err.to_string().contains("Docling is not installed"));
}

#[test]
fn version_output_parsing() {
    let out = "Docling version: 2.31.0\nDocling Core version: 2.28.1\nPython: cpython-312\n";
    assert_eq!(parse_version(out).as_deref(), Some("2.31.0"));
    assert_eq!(parse_version("2.5.1\n").as_deref(), Some("2.5.1"));
    assert_eq!(parse_version("\n"), None);
}
