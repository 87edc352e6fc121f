use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use complaintkit_client::{Error as ClientError, ProgressHandlers};
use complaintkit_protocol::{ComplaintSubmission, Priority};
use complaintkit_submit::{SubmitError, SubmitEvent, Submitter};
use complaintkit_transfer::{BatchUsage, ChunkPlan, EvidenceFile, FileValidator, ValidationPolicy};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", s);
    Ok(())
}

/// Parses `--metadata` as a JSON object.
pub fn parse_metadata(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("metadata must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid metadata JSON: {e}")),
    }
}

fn load_files(paths: &[PathBuf]) -> anyhow::Result<Vec<EvidenceFile>> {
    paths
        .iter()
        .map(|p| {
            EvidenceFile::from_path(p).with_context(|| format!("Failed to open {}", p.display()))
        })
        .collect()
}

fn spawn_event_printer(mut rx: mpsc::Receiver<SubmitEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SubmitEvent::Progress { filename, percent } => {
                    eprintln!("{filename}: {percent:.0}%");
                }
                SubmitEvent::AttachmentUploaded {
                    filename,
                    attachment,
                } => eprintln!("{filename}: uploaded as {}", attachment.id),
                SubmitEvent::AttachmentFailed { filename, error } => {
                    eprintln!("{filename}: failed: {error}");
                }
            }
        }
    })
}

fn resume_hint(err: &SubmitError, path: Option<&Path>) {
    if let (true, Some(session_id)) = (err.is_resumable(), err.session_id()) {
        let file = path.map_or_else(|| "<file>".to_string(), |p| p.display().to_string());
        eprintln!("resume with: complaintkit resume {session_id} {file}");
    }
}

pub struct SubmitArgs {
    pub text: String,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub metadata: Option<Map<String, Value>>,
    pub files: Vec<PathBuf>,
    pub report: bool,
}

pub async fn submit(mut submitter: Submitter, args: SubmitArgs) -> anyhow::Result<()> {
    let submission = ComplaintSubmission {
        text: args.text,
        category: args.category,
        priority: args.priority,
        metadata: args.metadata,
    };
    let files = load_files(&args.files)?;
    let names: Vec<String> = files.iter().map(|f| f.name().to_string()).collect();

    let printer = submitter.take_events().map(spawn_event_printer);

    let outcome = if args.report {
        submitter
            .submit_complaint_with_report(&submission, files)
            .await
            .map(|report| {
                for f in report.resumable() {
                    let path = names
                        .iter()
                        .position(|n| *n == f.filename)
                        .and_then(|i| args.files.get(i));
                    resume_hint(&f.error, path.map(PathBuf::as_path));
                }
                let failed: Vec<Value> = report
                    .failed
                    .iter()
                    .map(|f| json!({ "filename": f.filename, "error": f.error.to_string() }))
                    .collect();
                json!({ "complaint": report.complaint, "failed": failed })
            })
    } else {
        submitter
            .submit_complaint(&submission, files)
            .await
            .map(|record| json!(record))
    };

    drop(submitter);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    match outcome {
        Ok(value) => print_json(&value),
        Err(err) => {
            if let SubmitError::Validation(rejections) = &err {
                for r in rejections {
                    eprintln!("rejected {} ({} bytes): {}", r.filename, r.size, r.reason);
                }
            }
            let path = match args.files.as_slice() {
                [only] => Some(only.as_path()),
                _ => None,
            };
            resume_hint(&err, path);
            Err(anyhow::Error::new(err).context("Submission failed"))
        }
    }
}

/// Checks files against the attachment policy without contacting the server.
pub fn validate(policy: ValidationPolicy, paths: &[PathBuf]) -> anyhow::Result<()> {
    let files = load_files(paths)?;
    let total = files.len();
    let report = FileValidator::new(policy).validate(files, BatchUsage::default());

    for f in &report.valid {
        println!("ok        {} ({} bytes, {})", f.name(), f.size(), f.mime_type());
    }
    for (f, reason) in &report.invalid {
        println!("rejected  {} ({} bytes): {}", f.name(), f.size(), reason);
    }
    if !report.is_clean() {
        bail!("{} of {} file(s) rejected", report.invalid.len(), total);
    }
    Ok(())
}

pub async fn show(submitter: &Submitter, complaint_id: &str) -> anyhow::Result<()> {
    let record = submitter.get_complaint(complaint_id).await?;
    print_json(&record)
}

pub async fn resume(
    mut submitter: Submitter,
    session_id: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let file = EvidenceFile::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let printer = submitter.take_events().map(spawn_event_printer);

    let outcome = submitter.resume_upload(session_id, &file).await;

    drop(submitter);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    match outcome {
        Ok(info) => print_json(&info),
        Err(err) => {
            resume_hint(&err, Some(path));
            Err(anyhow::Error::new(err).context("Resume failed"))
        }
    }
}

pub async fn delete_attachment(
    submitter: &Submitter,
    complaint_id: &str,
    attachment_id: &str,
) -> anyhow::Result<()> {
    submitter
        .delete_attachment(complaint_id, attachment_id)
        .await?;
    println!("deleted {attachment_id}");
    Ok(())
}

type Outcome = Result<(), ClientError>;

fn settle(slot: &Mutex<Option<oneshot::Sender<Outcome>>>, outcome: Outcome) {
    let sender = slot.lock().ok().and_then(|mut s| s.take());
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}

/// Follows server-side processing of a session until it completes, fails
/// or the user interrupts.
pub async fn watch(submitter: &Submitter, session_id: &str) -> anyhow::Result<()> {
    let (tx, rx) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let on_done = slot.clone();

    let handlers = ProgressHandlers::new()
        .on_progress(|percent| eprintln!("{percent:.0}%"))
        .on_complete(move || settle(&on_done, Ok(())))
        .on_error(move |err| settle(&slot, Err(err)));

    let mut subscription = submitter.subscribe_progress(session_id, handlers).await?;

    let result = tokio::select! {
        outcome = rx => match outcome {
            Ok(Ok(())) => {
                println!("complete");
                Ok(())
            }
            Ok(Err(err)) => Err(anyhow::Error::new(err).context("Processing failed")),
            Err(_) => Err(anyhow::anyhow!("progress stream closed without a result")),
        },
        _ = tokio::signal::ctrl_c() => {
            warn!(session = session_id, "interrupted, closing progress stream");
            subscription.close();
            Ok(())
        }
    };

    subscription.finished().await;
    result
}

/// Describes how a file of `size` bytes would be split into chunks.
pub fn plan(size: u64, chunk_size: u64) -> Value {
    let plan = ChunkPlan::new(size, chunk_size);
    let chunks: Vec<Value> = plan
        .ranges()
        .map(|r| json!({ "index": r.index, "start": r.start, "end": r.end }))
        .collect();
    json!({
        "fileSize": plan.file_size(),
        "chunkSize": plan.chunk_size(),
        "totalChunks": plan.total_chunks(),
        "chunks": chunks,
    })
}

pub fn print_plan(size: u64, chunk_size: u64) -> anyhow::Result<()> {
    print_json(&plan(size, chunk_size))
}
