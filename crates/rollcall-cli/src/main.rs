use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rollcall_app::attendance::MarkOutcome;
use rollcall_app::recognize::FaceLabel;
use rollcall_app::report::{default_csv_file_name, AttendanceReport};
use rollcall_app::{Config, Handler, Request, Response, Session};
use rollcall_core::frames::ImageDirSource;
use rollcall_store::PineconeService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance for small classes")]
struct Cli {
    /// TOML secrets file (default: $ROLLCALL_SECRETS, then ./secrets.toml)
    #[arg(long, global = true, value_name = "PATH")]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where faces come from: one still image or a directory of frames.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Input {
    /// A single still image
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,
    /// A directory of frames, replayed in file-name order
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show vector store and detector status
    Status,
    /// Enroll a new student
    Enroll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        roll: String,
        #[command(flatten)]
        input: Input,
    },
    /// Recognize faces against enrolled students
    Recognize {
        #[command(flatten)]
        input: Input,
        /// Mark attendance for the recognized student
        #[arg(long)]
        mark: bool,
    },
    /// Mark attendance for a student by name
    Mark {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        roll: String,
    },
    /// Show the latest day's attendance and per-student totals
    Report {
        /// Also write totals as CSV, to PATH or a timestamped file
        #[arg(long, num_args = 0..=1, value_name = "PATH")]
        csv: Option<Option<PathBuf>>,
    },
    /// Change a student's roll number everywhere
    UpdateRoll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        roll: String,
    },
    /// Delete all face and attendance data for a student
    Delete {
        #[arg(short, long)]
        name: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.secrets.as_deref()).context("failed to load configuration")?;

    let session = Session::new();
    let stop = session.stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current frame");
            stop.raise();
        }
    });

    // The cascade detector is not Send, so the handler is built on the blocking thread.
    let command = cli.command;
    tokio::task::spawn_blocking(move || run(config, session, command))
        .await
        .context("worker thread panicked")?
}

fn run(config: Config, mut session: Session, command: Commands) -> Result<()> {
    if let Commands::Delete { yes: false, name } = &command {
        bail!("deleting {name} removes all their face and attendance data; pass --yes to confirm");
    }

    let service = Arc::new(PineconeService::new(config.pinecone()));
    let mut handler = Handler::from_config(&config, service);

    match command {
        Commands::Status => match handler.handle(&mut session, Request::Status)? {
            Response::Status(status) => {
                match status.store_error {
                    None => println!(
                        "vector store: ready ({}, {})",
                        config.face_index, config.attendance_index
                    ),
                    Some(e) => println!("vector store: {e}"),
                }
                match status.detector_error {
                    None => println!("detector:     ready ({})", config.detector_model.display()),
                    Some(e) => println!("detector:     {e}"),
                }
                println!("dimension:    {}", status.dimension);
                println!("threshold:    {}", config.score_threshold);
            }
            other => unexpected(other)?,
        },

        Commands::Enroll { name, roll, input } => {
            let request = match input_source(&input)? {
                Source::Image(image) => Request::EnrollFromImage {
                    name,
                    roll_no: roll,
                    image,
                },
                Source::Frames(frames) => Request::EnrollLive {
                    name,
                    roll_no: roll,
                    source: Box::new(frames),
                },
            };
            match handler.handle(&mut session, request)? {
                Response::Enrolled(outcome) => println!(
                    "Enrolled {} (roll {}) with {} samples",
                    outcome.student_name, outcome.roll_no, outcome.uploaded
                ),
                other => unexpected(other)?,
            }
        }

        Commands::Recognize { input, mark } => match input_source(&input)? {
            Source::Image(image) => {
                let labels = match handler.handle(&mut session, Request::Recognize { image })? {
                    Response::Recognized(labels) => labels,
                    other => return unexpected(other),
                };
                print_labels(&labels);
                if mark {
                    let known: Vec<&FaceLabel> = labels.iter().filter(|l| l.recognition.is_known()).collect();
                    match known.as_slice() {
                        [one] => {
                            let request = Request::MarkAttendance {
                                name: one.recognition.name.clone(),
                                roll_no: one.recognition.roll_no.clone(),
                            };
                            print_marked(handler.handle(&mut session, request)?)?;
                        }
                        [] => bail!("no enrolled student recognized; attendance not marked"),
                        many => bail!("{} students recognized in one image; attendance not marked", many.len()),
                    }
                }
            }
            Source::Frames(frames) => {
                let request = Request::RecognizeLive {
                    source: Box::new(frames),
                };
                match handler.handle(&mut session, request)? {
                    Response::LiveFinished { summary, recognized } => {
                        println!(
                            "Processed {} frames, {} faces{}",
                            summary.frames,
                            summary.faces,
                            if summary.cancelled { " (stopped)" } else { "" }
                        );
                        println!(
                            "Recognized: {} (roll {}) score {:.2}",
                            recognized.name, recognized.roll_no, recognized.score
                        );
                    }
                    other => unexpected(other)?,
                }
                if mark {
                    print_marked(handler.handle(&mut session, Request::MarkRecognized)?)?;
                }
            }
        },

        Commands::Mark { name, roll } => {
            let request = Request::MarkAttendance { name, roll_no: roll };
            print_marked(handler.handle(&mut session, request)?)?;
        }

        Commands::Report { csv } => match handler.handle(&mut session, Request::ViewAttendance)? {
            Response::Attendance(report) => {
                if report.is_empty() {
                    println!("No attendance records found.");
                    return Ok(());
                }
                print_report(&report);
                if let Some(path) = csv {
                    let path = path.unwrap_or_else(|| {
                        PathBuf::from(default_csv_file_name(chrono::Local::now().naive_local()))
                    });
                    write_csv(&report, &path)?;
                    println!("Totals written to {}", path.display());
                }
            }
            other => unexpected(other)?,
        },

        Commands::UpdateRoll { name, roll } => {
            let request = Request::UpdateRollNo {
                name: name.clone(),
                roll_no: roll.clone(),
            };
            match handler.handle(&mut session, request)? {
                Response::RollUpdated(update) => println!(
                    "Roll number of {name} set to {roll}: {} face vectors, {} attendance records",
                    update.face_records, update.attendance_records
                ),
                other => unexpected(other)?,
            }
        }

        Commands::Delete { name, .. } => {
            // First request arms the confirmation, the second carries it out.
            for _ in 0..2 {
                match handler.handle(&mut session, Request::DeleteStudent { name: name.clone() })? {
                    Response::ConfirmDelete { .. } => continue,
                    Response::Deleted { name } => println!("Deleted all data for {name}"),
                    other => unexpected(other)?,
                }
            }
        }
    }

    Ok(())
}

enum Source {
    Image(image::RgbImage),
    Frames(ImageDirSource),
}

fn input_source(input: &Input) -> Result<Source> {
    match (&input.image, &input.frames) {
        (Some(path), _) => {
            let image = image::open(path)
                .with_context(|| format!("failed to open image {}", path.display()))?
                .to_rgb8();
            Ok(Source::Image(image))
        }
        (None, Some(dir)) => {
            let frames = ImageDirSource::open(dir)?;
            tracing::info!(dir = %dir.display(), frames = frames.remaining(), "replaying frames");
            Ok(Source::Frames(frames))
        }
        (None, None) => bail!("either --image or --frames is required"),
    }
}

fn print_labels(labels: &[FaceLabel]) {
    if labels.is_empty() {
        println!("No faces detected.");
    }
    for label in labels {
        let r = &label.region;
        println!(
            "[{},{} {}x{}] {} (roll {}) score {:.2}",
            r.x, r.y, r.width, r.height, label.recognition.name, label.recognition.roll_no, label.recognition.score
        );
    }
}

fn print_marked(response: Response) -> Result<()> {
    match response {
        Response::Marked {
            name,
            outcome: MarkOutcome::Recorded { time, .. },
        } => println!("Attendance marked for {name} at {time}"),
        Response::Marked {
            name,
            outcome: MarkOutcome::AlreadyMarked { .. },
        } => println!("Attendance for {name} was already marked today"),
        other => unexpected(other)?,
    }
    Ok(())
}

fn print_report(report: &AttendanceReport) {
    if let Some(day) = report.latest_date {
        println!("Attendance for {}", day.format("%Y-%m-%d"));
        println!("{:<10} {:<24} {:<12} {}", "Roll No", "Name", "Date", "Time");
        for row in &report.latest {
            println!("{:<10} {:<24} {:<12} {}", row.roll_no, row.name, row.date, row.time);
        }
        println!();
    }
    println!("Total attendance");
    println!("{:<10} {:<24} {}", "Roll No", "Name", "Days");
    for t in &report.totals {
        println!("{:<10} {:<24} {}", t.roll_no, t.name, t.total);
    }
}

fn write_csv(report: &AttendanceReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    report.write_totals_csv(file)?;
    Ok(())
}

fn unexpected(response: Response) -> Result<()> {
    bail!("unexpected response from handler: {response:?}")
}
