use std::fmt::Write as _;
use std::path::Path;

use divan::Bencher;
use xml_report_watcher::{ParseOutcome, ParserRegistry, RecordingSink, Snapshot};

fn main() {
    divan::main();
}

fn junit_report(tests: usize) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>
<testsuite name="com.example.BigTest">
"#);
    for i in 0..tests {
        if i % 10 == 0 {
            writeln!(
                xml,
                r#"  <testcase classname="com.example.BigTest" name="test{i}" time="0.01"><failure message="boom">at BigTest.test{i}</failure></testcase>"#
            )
            .unwrap();
        } else {
            writeln!(xml, r#"  <testcase classname="com.example.BigTest" name="test{i}" time="0.01"/>"#).unwrap();
        }
    }
    xml.push_str("</testsuite>\n");
    xml
}

fn checkstyle_report(findings: usize) -> String {
    let mut xml = String::from("<checkstyle version=\"5.0\">\n  <file name=\"src/Main.java\">\n");
    for i in 0..findings {
        writeln!(
            xml,
            r#"    <error line="{i}" severity="warning" message="Magic number." source="com.puppycrawl.MagicNumberCheck{}"/>"#,
            i % 7
        )
        .unwrap();
    }
    xml.push_str("  </file>\n</checkstyle>\n");
    xml
}

#[divan::bench(args = [10, 100, 1000])]
fn parse_complete_junit(bencher: Bencher, tests: usize) {
    let registry = ParserRegistry::with_builtin();
    let factory = *registry.get("junit").unwrap();
    let xml = junit_report(tests);

    bencher.bench_local(|| {
        let mut parser = factory.create();
        let mut sink = RecordingSink::new();
        parser.parse(&Snapshot::new(Path::new("TEST-big.xml"), xml.as_bytes()), 0, &mut sink)
    });
}

/// A report that grows in ten steps, parsed again after every step.
#[divan::bench(args = [100, 1000])]
fn parse_growing_junit(bencher: Bencher, tests: usize) {
    let registry = ParserRegistry::with_builtin();
    let factory = *registry.get("junit").unwrap();
    let xml = junit_report(tests);
    let step = xml.len() / 10;

    bencher.bench_local(|| {
        let mut parser = factory.create();
        let mut sink = RecordingSink::new();
        let mut emitted = 0;
        for cut in (1..=10).map(|i| (i * step).min(xml.len())).chain([xml.len()]) {
            let snapshot = Snapshot::new(Path::new("TEST-big.xml"), &xml.as_bytes()[..cut]);
            if let ParseOutcome::Incomplete { emitted: now } = parser.parse(&snapshot, emitted, &mut sink) {
                emitted = now;
            }
        }
        sink.events.len()
    });
}

#[divan::bench(args = [100, 1000])]
fn parse_checkstyle(bencher: Bencher, findings: usize) {
    let registry = ParserRegistry::with_builtin();
    let factory = *registry.get("checkstyle").unwrap();
    let xml = checkstyle_report(findings);

    bencher.bench_local(|| {
        let mut parser = factory.create();
        let mut sink = RecordingSink::new();
        parser.parse(&Snapshot::new(Path::new("checkstyle.xml"), xml.as_bytes()), 0, &mut sink)
    });
}
