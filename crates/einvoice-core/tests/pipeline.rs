//! End-to-end pipeline runs with in-process engine doubles.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use einvoice_core::error::{DialectError, PipelineError, RenderError, TransformEngineError};
use einvoice_core::models::key_fields::NOT_FOUND;
use einvoice_core::transform::CANONICAL_NAMESPACE;
use einvoice_core::{
    ArchiveLayout, DetectedFormat, EinvoiceConfig, Executable, InvoiceCache, KeyFields, LayoutRenderer,
    PipelineOrchestrator, PipelineState, RawDocument, Stage, StagedFileCleanup, StagingService, TemplateRef,
    TransformEngine, XmlDialect, XmlDocument,
};
use lopdf::{dictionary, Document, Object, Stream};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use tempfile::TempDir;

const UBL_INVOICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"
         xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2"
         xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2">
  <cbc:ID>INV-2024-001</cbc:ID>
  <cbc:IssueDate>2024-03-05</cbc:IssueDate>
  <cbc:InvoiceTypeCode>380</cbc:InvoiceTypeCode>
  <cac:AccountingSupplierParty><cac:Party><cac:PartyName><cbc:Name>Acme &amp; Co.</cbc:Name></cac:PartyName></cac:Party></cac:AccountingSupplierParty>
  <cac:LegalMonetaryTotal><cbc:TaxInclusiveAmount currencyID="EUR">119.00</cbc:TaxInclusiveAmount></cac:LegalMonetaryTotal>
</Invoice>"#;

const CII_INVOICE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rsm:CrossIndustryInvoice xmlns:rsm="urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100">
  <rsm:ExchangedDocument/>
</rsm:CrossIndustryInvoice>"#;

const UNKNOWN_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Order xmlns="urn:example:orders"><Id>1</Id></Order>"#;

fn canonical(with_issue_date: bool) -> XmlDocument {
    let issue_date = if with_issue_date {
        "<xr:Invoice_issue_date>2024-03-05</xr:Invoice_issue_date>"
    } else {
        ""
    };
    XmlDocument::parse_str(&format!(
        r#"<xr:invoice xmlns:xr="{CANONICAL_NAMESPACE}">
             <xr:Invoice_number>INV-2024-001</xr:Invoice_number>
             {issue_date}
             <xr:Invoice_type_code>380</xr:Invoice_type_code>
             <xr:SELLER><xr:Seller_name>Acme &amp; Co.</xr:Seller_name></xr:SELLER>
             <xr:DOCUMENT_TOTALS>
               <xr:Invoice_total_amount_with_VAT>119.00</xr:Invoice_total_amount_with_VAT>
             </xr:DOCUMENT_TOTALS>
           </xr:invoice>"#
    ))
    .unwrap()
}

/// Transform engine double: dialect templates yield a fixed canonical
/// document, the layout template a fixed FO document.
struct FixtureEngine {
    canonical: XmlDocument,
    layout_template: PathBuf,
    compiled: Mutex<Vec<PathBuf>>,
}

struct FixedOutput(XmlDocument);

impl Executable for FixedOutput {
    fn apply(&self, _input: &XmlDocument) -> Result<XmlDocument, TransformEngineError> {
        Ok(self.0.clone())
    }
}

impl TransformEngine for FixtureEngine {
    fn compile(&self, template: &TemplateRef) -> Result<Box<dyn Executable>, TransformEngineError> {
        self.compiled.lock().unwrap().push(template.path().to_path_buf());
        let output = if template.path() == self.layout_template {
            XmlDocument::parse_str(r#"<fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format"/>"#)?
        } else {
            self.canonical.clone()
        };
        Ok(Box::new(FixedOutput(output)))
    }
}

/// Renderer double writing a small PDF-looking artifact.
struct FakeRenderer {
    calls: AtomicUsize,
    fail: bool,
}

impl LayoutRenderer for FakeRenderer {
    fn render(&self, layout_path: &Path, output_path: &Path) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(layout_path.exists());
        std::fs::write(output_path, b"%PDF-1.4 rendered invoice")?;
        if self.fail {
            return Err(RenderError::Engine("renderer crashed".to_string()));
        }
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    config: EinvoiceConfig,
    engine: Arc<FixtureEngine>,
    renderer: Arc<FakeRenderer>,
    orchestrator: PipelineOrchestrator,
}

impl Harness {
    fn new() -> Self {
        Self::with(canonical(true), false)
    }

    fn with(canonical: XmlDocument, fail_render: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EinvoiceConfig::default();
        config.storage.temp_dir = dir.path().join("tempfiles");
        config.storage.output_dir = dir.path().join("invoices");

        let engine = Arc::new(FixtureEngine {
            canonical,
            layout_template: config.templates.layout.clone(),
            compiled: Mutex::new(Vec::new()),
        });
        let renderer = Arc::new(FakeRenderer {
            calls: AtomicUsize::new(0),
            fail: fail_render,
        });
        let orchestrator = PipelineOrchestrator::builder(&config)
            .with_transform_engine(engine.clone())
            .with_layout_renderer(renderer.clone())
            .build()
            .unwrap();

        Self {
            dir,
            config,
            engine,
            renderer,
            orchestrator,
        }
    }

    fn input(&self, name: &str, content: &[u8]) -> RawDocument {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        RawDocument::new(path)
    }

    fn compiled(&self) -> Vec<PathBuf> {
        self.engine.compiled.lock().unwrap().clone()
    }

    fn render_calls(&self) -> usize {
        self.renderer.calls.load(Ordering::SeqCst)
    }
}

fn pdf(attachment: Option<(&str, &str)>) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let mut catalog = dictionary! { "Type" => "Catalog", "Pages" => pages_id };

    if let Some((name, xml)) = attachment {
        let file_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "EmbeddedFile" },
            xml.as_bytes().to_vec(),
        ));
        let filespec_id = doc.add_object(dictionary! {
            "Type" => "Filespec",
            "F" => Object::string_literal(name),
            "EF" => dictionary! { "F" => file_id },
        });
        catalog.set(
            "Names",
            dictionary! {
                "EmbeddedFiles" => dictionary! {
                    "Names" => vec![Object::string_literal(name), filespec_id.into()],
                },
            },
        );
    }

    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[test]
fn ubl_invoice_completes() {
    let harness = Harness::new();
    let raw = harness.input("invoice.xml", UBL_INVOICE.as_bytes());

    let result = harness.orchestrator.run(&raw).unwrap();

    assert_eq!(result.final_state, PipelineState::Complete);
    assert_eq!(result.detected_format, DetectedFormat::Xml);
    assert_eq!(result.dialect, XmlDialect::UblInvoice);
    // Trailing dots are stripped from directory names.
    assert_eq!(result.key_fields.seller_name, "Acme Co");
    assert_eq!(result.key_fields.invoice_reference, "INV-2024-001");
    assert_eq!(result.key_fields.invoice_type_code, Some(380));
    assert_eq!(result.key_fields.issued_date, NaiveDate::from_ymd_opt(2024, 3, 5));
    assert_eq!(result.key_fields.total_amount, Some(Decimal::from_str("119.00").unwrap()));
    assert_eq!(result.content_fingerprint.len(), 64);
    assert_eq!(result.original_file_path, raw.path());

    let artifact = result.rendered_artifact_path.clone().unwrap();
    assert_eq!(
        artifact,
        harness.config.storage.temp_dir.join(format!("gen_{}.pdf", result.id))
    );
    assert!(!std::fs::read(&artifact).unwrap().is_empty());
    assert_eq!(
        harness.compiled(),
        vec![
            harness.config.templates.ubl_invoice.clone(),
            harness.config.templates.layout.clone()
        ]
    );
}

#[test]
fn embedded_invoice_pdf_completes() {
    let harness = Harness::new();
    let raw = harness.input("zugferd.pdf", &pdf(Some(("factur-x.xml", UBL_INVOICE))));

    let result = harness.orchestrator.run(&raw).unwrap();

    assert_eq!(result.detected_format, DetectedFormat::PdfEmbeddedXml);
    assert_eq!(result.dialect, XmlDialect::UblInvoice);
    assert_eq!(result.final_state, PipelineState::Complete);
    assert_eq!(harness.render_calls(), 1);
}

#[test]
fn plain_pdf_is_skipped() {
    let harness = Harness::new();
    let raw = harness.input("scan.pdf", &pdf(None));

    let result = harness.orchestrator.run(&raw).unwrap();

    assert_eq!(result.final_state, PipelineState::SkippedNonEinvoice);
    assert_eq!(result.detected_format, DetectedFormat::PdfPlain);
    assert_eq!(result.dialect, XmlDialect::None);
    assert_eq!(result.key_fields, KeyFields::absent());
    assert_eq!(result.key_fields.invoice_reference, NOT_FOUND);
    assert_eq!(result.rendered_artifact_path, None);
    assert_eq!(result.display_path(), raw.path());
    assert!(harness.compiled().is_empty());
    assert_eq!(harness.render_calls(), 0);
}

#[test]
fn unknown_dialect_fails_before_rendering() {
    let harness = Harness::new();
    let raw = harness.input("order.xml", UNKNOWN_XML.as_bytes());

    let err = harness.orchestrator.run(&raw).unwrap_err();

    assert_eq!(err.stage, Stage::Canonicalize);
    assert!(matches!(
        err.source,
        PipelineError::Dialect(DialectError::Unsupported(XmlDialect::Unknown))
    ));
    assert_eq!(err.error_code().code(), "ERR003");
    assert!(harness.compiled().is_empty());
    assert_eq!(harness.render_calls(), 0);
}

#[test]
fn cii_uses_cii_template() {
    let harness = Harness::new();
    let raw = harness.input("cii.xml", CII_INVOICE.as_bytes());

    let result = harness.orchestrator.run(&raw).unwrap();

    assert_eq!(result.dialect, XmlDialect::Cii);
    assert_eq!(harness.compiled()[0], harness.config.templates.cii);
}

#[test]
fn missing_issue_date_only_affects_that_field() {
    let harness = Harness::with(canonical(false), false);
    let raw = harness.input("invoice.xml", UBL_INVOICE.as_bytes());

    let result = harness.orchestrator.run(&raw).unwrap();

    assert_eq!(result.final_state, PipelineState::Complete);
    assert_eq!(result.key_fields.issued_date, None);
    assert_eq!(result.key_fields.issued_date_or_sentinel(), NaiveDate::MIN);
    assert_eq!(result.key_fields.invoice_reference, "INV-2024-001");
    assert_eq!(result.key_fields.invoice_type_code, Some(380));
    assert_eq!(result.key_fields.total_amount, Some(Decimal::from_str("119.00").unwrap()));
}

#[test]
fn invalid_input_fails_detection() {
    let harness = Harness::new();
    let raw = harness.input("invoice.xml", b"\xEF\xBB\xBF<?xml version=\"1.0\"?>");

    let err = harness.orchestrator.run(&raw).unwrap_err();

    assert_eq!(err.stage, Stage::Detect);
    assert_eq!(err.error_code().code(), "ERR001");
}

#[test]
fn render_failure_leaves_no_artifact() {
    let harness = Harness::with(canonical(true), true);
    let raw = harness.input("invoice.xml", UBL_INVOICE.as_bytes());
    let id = uuid::Uuid::new_v4();

    let err = harness.orchestrator.run_with_id(id, &raw).unwrap_err();

    assert_eq!(err.stage, Stage::Render);
    assert_eq!(err.root_cause().to_string(), "rendering engine failed: renderer crashed");
    assert!(!harness.config.storage.temp_dir.join(format!("gen_{}.pdf", id)).exists());
}

#[test]
fn concurrent_runs_share_one_orchestrator() {
    let harness = Harness::new();
    let inputs: Vec<RawDocument> = (0..4)
        .map(|i| harness.input(&format!("invoice-{}.xml", i), UBL_INVOICE.as_bytes()))
        .collect();

    let orchestrator = &harness.orchestrator;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|raw| scope.spawn(move || orchestrator.run(raw).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.final_state == PipelineState::Complete));
    // Same content, same fingerprint, distinct ids.
    assert!(results.windows(2).all(|w| w[0].content_fingerprint == w[1].content_fingerprint));
    assert!(results.windows(2).all(|w| w[0].id != w[1].id));
}

#[test]
fn staged_upload_is_archived_on_confirm() {
    let harness = Harness::new();
    let Harness {
        dir: _dir,
        config,
        orchestrator,
        ..
    } = harness;
    let cache = Arc::new(InvoiceCache::new(&config.cache, StagedFileCleanup));
    let service = StagingService::new(
        Arc::new(orchestrator),
        cache.clone(),
        ArchiveLayout::new(&config.storage.output_dir),
        &config.storage.temp_dir,
    );

    let result = service.upload("invoice.xml", UBL_INVOICE.as_bytes()).unwrap();
    let staged = result.backing_files().iter().map(|p| p.to_path_buf()).collect::<Vec<_>>();
    assert_eq!(staged.len(), 2);
    assert!(staged.iter().all(|p| p.exists()));
    assert_eq!(cache.len(), 1);

    let paths = service.confirm(result.id, None).unwrap();

    let seller_dir = config.storage.output_dir.join("Acme Co");
    assert_eq!(
        paths.generated,
        seller_dir.join(format!("INV-2024-001_{}.pdf", result.content_fingerprint))
    );
    assert_eq!(
        paths.original,
        seller_dir.join(format!("original_INV-2024-001_{}.xml", result.content_fingerprint))
    );
    assert!(paths.generated.exists() && paths.original.exists());
    assert!(staged.iter().all(|p| !p.exists()));
    assert!(cache.is_empty());
}

#[test]
fn released_run_leaves_temp_dir_empty() {
    let harness = Harness::new();
    let raw = harness.input("invoice.xml", UBL_INVOICE.as_bytes());

    let mut result = harness.orchestrator.run(&raw).unwrap();
    result.release_artifact(None).unwrap();

    let leftovers = std::fs::read_dir(&harness.config.storage.temp_dir).unwrap().count();
    assert_eq!(leftovers, 0);
    assert_eq!(result.rendered_artifact_path, None);
}

#[test]
fn released_run_keeps_artifact_at_target() {
    let harness = Harness::new();
    let raw = harness.input("invoice.xml", UBL_INVOICE.as_bytes());
    let target = harness.dir.path().join("out").join("invoice.pdf");

    let mut result = harness.orchestrator.run(&raw).unwrap();
    result.release_artifact(Some(&target)).unwrap();

    assert_eq!(std::fs::read_dir(&harness.config.storage.temp_dir).unwrap().count(), 0);
    assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.4 rendered invoice");
    assert_eq!(result.display_path(), target);
}
