use dashboard_report::builder::ReportBuilder;
use dashboard_report::charts::render_static_chart;
use dashboard_report::dataset::{DataRow, Dataset};
use dashboard_report::metrics::{calculate_metrics, Metric};
use dashboard_report::model::{MetricSection, ReportContent};
use dashboard_report::session::DashboardSession;
use sha2::{Digest, Sha256};

fn text_only_content() -> ReportContent {
    ReportContent::default().with_metrics(calculate_metrics(&[]))
}

fn render(content: &ReportContent) -> Vec<u8> {
    ReportBuilder::new()
        .with_page_numbers(true)
        .render(content)
        .expect("render report")
        .bytes
}

fn page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes)
        .expect("reparse rendered PDF")
        .get_pages()
        .len()
}

fn scrub_pdf(bytes: &[u8]) -> Vec<u8> {
    fn scrub_segment(data: &mut [u8], tag: &[u8], terminator: u8) {
        let mut index = 0;
        while index + tag.len() < data.len() {
            if data[index..].starts_with(tag) {
                let mut cursor = index + tag.len();
                while cursor < data.len() {
                    let byte = data[cursor];
                    if byte == terminator {
                        break;
                    }
                    if terminator == b')' {
                        data[cursor] = b'0';
                    } else if !matches!(byte, b'<' | b'>' | b' ' | b'\n' | b'\r' | b'\t') {
                        data[cursor] = b'0';
                    }
                    cursor += 1;
                }
                index = cursor;
            } else {
                index += 1;
            }
        }
    }

    let mut normalized = bytes.to_vec();
    scrub_segment(&mut normalized, b"/CreationDate(", b')');
    scrub_segment(&mut normalized, b"/ModDate(", b')');
    scrub_segment(&mut normalized, b"/ID[", b']');
    scrub_segment(&mut normalized, b"/Producer(", b')');
    normalized
}

fn normalized_hash(bytes: &[u8]) -> [u8; 32] {
    let normalized = scrub_pdf(bytes);
    let digest = Sha256::digest(&normalized);
    digest.into()
}

#[test]
fn renders_non_empty_output() {
    let bytes = render(&text_only_content());
    assert!(
        bytes.starts_with(b"%PDF"),
        "rendered report should start with a PDF header"
    );
}

#[test]
fn rendering_is_deterministic() {
    let bytes_a = render(&text_only_content());
    let bytes_b = render(&text_only_content());

    assert_eq!(bytes_a.len(), bytes_b.len(), "PDF sizes should match");
    assert_eq!(
        normalized_hash(&bytes_a),
        normalized_hash(&bytes_b),
        "PDF renders must be deterministic after metadata normalization"
    );
}

#[test]
fn empty_report_has_one_page() {
    let report = ReportBuilder::new()
        .render(&ReportContent::default())
        .expect("render empty report");
    assert_eq!(report.page_count, 1);
    assert_eq!(page_count(&report.bytes), 1);
}

#[test]
fn page_count_matches_the_written_document() {
    let commentary = (1..=40)
        .map(|i| format!("Week {i}: spend tracked plan"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut content = text_only_content();
    for metric in [Metric::Spend, Metric::Bookings, Metric::Cpc] {
        content.add_section(
            MetricSection::new(metric, render_static_chart(&[], metric).unwrap())
                .with_commentary(commentary.as_str()),
        );
    }

    let report = ReportBuilder::new().render(&content).expect("render report");
    assert!(report.page_count > 1);
    assert_eq!(page_count(&report.bytes), report.page_count);
}

#[test]
fn session_report_renders_from_csv() {
    let csv = "\
Date,Channel,Spend,Impressions,Bookings,CPB,CPC
2023-03-01,Search,120.5,1500,4,30.125,0.08
2023-03-01,Social,80,2200,2,40,0.04
2023-03-02,Search,130,1600,5,26,0.081
2023-03-02,Social,75.25,2100,3,25.08,0.036
";
    let dataset = Dataset::from_reader(csv.as_bytes()).expect("parse csv");
    let mut session = DashboardSession::new(dataset);
    session.set_commentary(Metric::Bookings, "Bookings rose on search.");

    let report = session
        .generate_report(&ReportBuilder::new())
        .expect("render session report");
    assert_eq!(report.sections.len(), 5);
    assert_eq!(page_count(&report.bytes), report.page_count);
    assert_eq!(report.file_name(), "dashboard_report.pdf");
}

#[test]
fn in_memory_rows_render_charts() {
    let rows: Vec<DataRow> = Dataset::from_reader(
        "Date,Channel,Spend,Impressions,Bookings,CPB,CPC\n2023-03-05,Search,10,100,1,10,0.1\n"
            .as_bytes(),
    )
    .unwrap()
    .rows()
    .to_vec();
    let content = ReportContent::default()
        .with_metrics(calculate_metrics(&rows))
        .with_section(MetricSection::new(Metric::Spend, render_static_chart(&rows, Metric::Spend).unwrap()));
    let report = ReportBuilder::new().render(&content).unwrap();
    assert_eq!(report.page_count, 1);
}
