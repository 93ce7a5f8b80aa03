use docling_batch::{
    classify::FailureKind,
    report::{render_error_log, BatchReport},
};
use time::macros::datetime;

#[test]
fn error_log_layout() {
    let mut report = BatchReport::new(3);
    report.record_success("a.md");
    report.record_failure("b.pdf", FailureKind::Other, "file is damaged");
    report.record_failure("c.docx", FailureKind::Memory, "Memory error: out of memory");

    let log = render_error_log(&report, datetime!(2024-03-05 07:08:09 UTC));
    let expected = "ERROR LOG - DOCLING CONVERSION\n\
                    ========================================\n\
                    Date: 2024-03-05 07:08:09\n\
                    Total files: 3\n\
                    Successes: 1\n\
                    Failures: 2\n\
                    \n\
                    b.pdf: file is damaged\n\
                    c.docx: Memory error: out of memory\n";
    assert_eq!(log, expected);
}

#[test]
fn success_rate_uses_attempted_conversions() {
    let mut report = BatchReport::new(1);
    assert_eq!(report.success_rate(), 0.0);

    // One large file split into four chunks: rate stays within 0..=100.
    for i in 0..3 {
        report.record_success(format!("big_chunk_{i}.md"));
    }
    report.record_failure("big_chunk_4.pdf", FailureKind::Gpu, "GPU-related error: CUDA");
    assert_eq!(report.attempted(), 4);
    assert!((report.success_rate() - 75.0).abs() < f64::EPSILON);
    assert!(report.summary_lines().contains(&"Success rate: 75.0%".to_string()));
}

#[test]
fn summary_notes_an_interrupted_run() {
    let mut report = BatchReport::new(5);
    report.record_success("a.md");
    assert!(!report.summary_lines().iter().any(|l| l.contains("interrupted")));

    report.interrupted = true;
    assert_eq!(
        report.summary_lines().last().map(String::as_str),
        Some("Processing interrupted by user")
    );
}
