//! Order-preserving PDF merge.
//!
//! Per-page PDFs are concatenated into one document at the object level with
//! `lopdf`: every input is renumbered into a shared id space, its pages are
//! re-parented under a single page tree, and the first catalog becomes the
//! merged document's root. Page order is exactly input order, then page order
//! within each input.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info, instrument, warn};

use sitepdf_shared::{Result, SitePdfError};

/// PDF version written for merged documents.
const MERGED_PDF_VERSION: &str = "1.5";

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Upper bound on `Parent` hops, so a cyclic tree cannot loop forever.
const MAX_TREE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// MergeReport
// ---------------------------------------------------------------------------

/// What a merge actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Inputs whose pages were appended.
    pub inputs_merged: usize,
    /// Inputs that did not exist at merge time.
    pub inputs_skipped: usize,
    /// Pages in the written document.
    pub page_count: usize,
}

impl MergeReport {
    /// Whether an output file was written.
    pub fn wrote_output(&self) -> bool {
        self.inputs_merged > 0
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge `inputs`, in order, into `output`.
///
/// Inputs missing from disk are skipped. When nothing is left to merge no
/// file is written. An input that exists but is not a readable PDF fails the
/// merge.
#[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut documents = Vec::with_capacity(inputs.len());

    for path in inputs {
        if !path.is_file() {
            debug!(path = %path.display(), "merge input missing, skipping");
            report.inputs_skipped += 1;
            continue;
        }
        let doc = Document::load(path)
            .map_err(|e| SitePdfError::Merge(format!("failed to read {}: {e}", path.display())))?;
        documents.push(doc);
    }

    if documents.is_empty() {
        warn!(skipped = report.inputs_skipped, "nothing to merge, no output written");
        return Ok(report);
    }

    report.inputs_merged = documents.len();

    let mut merged = concatenate(documents)?;
    report.page_count = merged.get_pages().len();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SitePdfError::io(parent, e))?;
    }
    merged.save(output).map_err(|e| {
        SitePdfError::Merge(format!("failed to write {}: {e}", output.display()))
    })?;

    info!(
        merged = report.inputs_merged,
        skipped = report.inputs_skipped,
        pages = report.page_count,
        "merged PDF written"
    );
    Ok(report)
}

/// Splice the page trees of `documents` into one document.
fn concatenate(documents: Vec<Document>) -> Result<Document> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut page_tree: Option<(ObjectId, Object)> = None;
    let mut merged = Document::with_version(MERGED_PDF_VERSION);

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // get_pages is keyed by page number, so this keeps reading order.
        for (_, page_id) in doc.get_pages() {
            let mut page = doc
                .get_object(page_id)
                .map_err(|e| SitePdfError::Merge(format!("missing page object: {e}")))?
                .to_owned();
            // The original Pages nodes are discarded below.
            if let Object::Dictionary(dict) = &mut page {
                inherit_attributes(&doc, dict);
            }
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            match type_name(&object) {
                Some(b"Catalog") => {
                    if catalog.is_none() {
                        catalog = Some((id, object));
                    }
                }
                Some(b"Pages") => {
                    if page_tree.is_none() {
                        page_tree = Some((id, object));
                    }
                }
                // Pages are re-inserted below; outlines are dropped.
                Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
    }

    let (catalog_id, catalog) =
        catalog.ok_or_else(|| SitePdfError::Merge("no document catalog found".into()))?;
    let (tree_id, tree) =
        page_tree.ok_or_else(|| SitePdfError::Merge("no page tree found".into()))?;

    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, page) in pages {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", Object::Reference(tree_id));
            merged.objects.insert(page_id, Object::Dictionary(dict));
            kids.push(Object::Reference(page_id));
        }
    }

    let mut tree = tree
        .as_dict()
        .map_err(|e| SitePdfError::Merge(format!("page tree is not a dictionary: {e}")))?
        .clone();
    tree.set("Count", Object::Integer(kids.len() as i64));
    tree.set("Kids", Object::Array(kids));
    tree.remove(b"Parent");
    merged.objects.insert(tree_id, Object::Dictionary(tree));

    let mut catalog = catalog
        .as_dict()
        .map_err(|e| SitePdfError::Merge(format!("catalog is not a dictionary: {e}")))?
        .clone();
    catalog.set("Pages", Object::Reference(tree_id));
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));

    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();

    Ok(merged)
}

/// Copy attributes the page only has through its ancestors onto the page.
fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(id) = parent {
        if depth == MAX_TREE_DEPTH {
            warn!("page tree deeper than {MAX_TREE_DEPTH} levels, stopping inheritance");
            break;
        }
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
}

fn type_name(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn tmp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sitepdf-{tag}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create tmp dir");
        dir
    }

    /// Write a PDF with one blank page per width; the width identifies the page.
    fn write_pdf(path: &Path, widths: &[i64]) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = widths
            .iter()
            .map(|w| {
                let page: Dictionary = dictionary! {
                    "Type" => Object::Name(b"Page".to_vec()),
                    "Parent" => Object::Reference(pages_id),
                    "MediaBox" => Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(*w),
                        Object::Integer(842),
                    ]),
                };
                Object::Reference(doc.add_object(page))
            })
            .collect();

        let pages: Dictionary = dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Count" => Object::Integer(widths.len() as i64),
            "Kids" => Object::Array(kids),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog: Dictionary = dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        };
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).expect("save test pdf");
    }

    fn page_widths(path: &Path) -> Vec<i64> {
        let doc = Document::load(path).expect("load merged pdf");
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_object(*id).unwrap().as_dict().unwrap();
                let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
                media_box[2].as_i64().unwrap()
            })
            .collect()
    }

    #[test]
    fn merges_in_input_order() {
        let dir = tmp_dir("merge-order");
        let a = dir.join("a.pdf");
        let b = dir.join("b.pdf");
        let c = dir.join("c.pdf");
        write_pdf(&a, &[100, 101]);
        write_pdf(&b, &[200]);
        write_pdf(&c, &[300, 301, 302]);

        let out = dir.join("merged.pdf");
        // Deliberately not alphabetical.
        let report = merge_pdfs(&[c.clone(), a.clone(), b.clone()], &out).unwrap();

        assert_eq!(report.inputs_merged, 3);
        assert_eq!(report.inputs_skipped, 0);
        assert_eq!(report.page_count, 6);
        assert_eq!(page_widths(&out), vec![300, 301, 302, 100, 101, 200]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// One page whose MediaBox and Rotate live on an intermediate Pages node.
    fn write_pdf_with_inherited_box(path: &Path, width: i64) {
        let mut doc = Document::with_version("1.5");
        let root_id = doc.new_object_id();
        let branch_id = doc.new_object_id();

        let page: Dictionary = dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "Parent" => Object::Reference(branch_id),
        };
        let page_id = doc.add_object(page);

        let branch: Dictionary = dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Parent" => Object::Reference(root_id),
            "Count" => Object::Integer(1),
            "Kids" => Object::Array(vec![Object::Reference(page_id)]),
            "MediaBox" => Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(842),
            ]),
        };
        doc.objects.insert(branch_id, Object::Dictionary(branch));

        let root: Dictionary = dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Count" => Object::Integer(1),
            "Kids" => Object::Array(vec![Object::Reference(branch_id)]),
            "Rotate" => Object::Integer(90),
        };
        doc.objects.insert(root_id, Object::Dictionary(root));

        let catalog: Dictionary = dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(root_id),
        };
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.save(path).expect("save test pdf");
    }

    #[test]
    fn inherited_page_attributes_survive_merge() {
        let dir = tmp_dir("merge-inherit");
        let a = dir.join("a.pdf");
        let b = dir.join("b.pdf");
        write_pdf(&a, &[100]);
        write_pdf_with_inherited_box(&b, 250);

        let out = dir.join("merged.pdf");
        merge_pdfs(&[a, b], &out).unwrap();

        // page_widths reads the MediaBox off the page dictionary itself.
        assert_eq!(page_widths(&out), vec![100, 250]);

        let doc = Document::load(&out).unwrap();
        let second = *doc.get_pages().get(&2).unwrap();
        let page = doc.get_dictionary(second).unwrap();
        assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_inputs_are_skipped() {
        let dir = tmp_dir("merge-missing");
        let a = dir.join("a.pdf");
        let c = dir.join("c.pdf");
        write_pdf(&a, &[100]);
        write_pdf(&c, &[300]);

        let out = dir.join("merged.pdf");
        let report = merge_pdfs(&[a, dir.join("b.pdf"), c], &out).unwrap();

        assert_eq!(report.inputs_merged, 2);
        assert_eq!(report.inputs_skipped, 1);
        assert_eq!(page_widths(&out), vec![100, 300]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_input_writes_nothing() {
        let dir = tmp_dir("merge-empty");
        let out = dir.join("merged.pdf");

        let report = merge_pdfs(&[], &out).unwrap();
        assert!(!report.wrote_output());
        assert!(!out.exists());

        let report = merge_pdfs(&[dir.join("gone.pdf")], &out).unwrap();
        assert_eq!(report.inputs_skipped, 1);
        assert!(!out.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unreadable_input_is_merge_error() {
        let dir = tmp_dir("merge-corrupt");
        let bad = dir.join("bad.pdf");
        std::fs::write(&bad, b"this is not a pdf").unwrap();

        let err = merge_pdfs(&[bad], &dir.join("merged.pdf")).unwrap_err();
        assert!(matches!(err, SitePdfError::Merge(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
