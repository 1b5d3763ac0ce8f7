//! `rusty-ict`: drives the tester core against the simulated bench.
//!
//! The chip named with `--part` is built from its profile and mounted in the
//! simulated socket; the tester then treats it exactly like a real device.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use crossterm::style::{Color, StyledContent, Stylize};
use log::debug;

use rusty_ict::{
    Bench, ByteStream, ChipType, DeviceFactory, Fault, IcRecord, Identification, StreamMode,
    TestOutcome, TestPattern, Tester, TesterConfig, TesterError, Verdict, VirtualClock,
    ZifGeneration,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Universal IC tester on a simulated bench", long_about = None)]
struct Cli {
    /// Tester configuration (JSON).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Socket generation, overriding the configuration.
    #[arg(long, value_parser = parse_socket)]
    socket: Option<ZifGeneration>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every known chip family.
    List,
    /// Mount a part and identify it without telling the tester what it is.
    Identify {
        /// Part to mount, e.g. 4164 or TMS4164-15NL.
        #[arg(long)]
        part: String,
        /// Tell the tester the chip type.
        #[arg(long, value_parser = parse_chip_type)]
        chip_type: Option<ChipType>,
    },
    /// Run a functional test.
    Test {
        #[arg(long)]
        part: String,
        #[arg(long, default_value = "march")]
        pattern: TestPattern,
        /// stuck:<pin>:<high|low>, dead:<lane> or flaky:<lane>:<period>; repeatable.
        #[arg(long = "fault")]
        faults: Vec<Fault>,
    },
    /// Read a ROM, FRAM, Flash or SRAM into a file.
    Dump {
        #[arg(long)]
        part: String,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
        /// Contents preloaded into the simulated chip.
        #[arg(long, value_name = "FILE")]
        preload: Option<PathBuf>,
    },
    /// Write an image into a FRAM or Flash and verify it.
    Program {
        #[arg(long)]
        part: String,
        #[arg(long, value_name = "FILE")]
        image: PathBuf,
        /// Erase before programming.
        #[arg(long)]
        erase: bool,
    },
}

fn parse_socket(s: &str) -> Result<ZifGeneration, String> {
    match s.to_ascii_lowercase().as_str() {
        "zif20" | "20" => Ok(ZifGeneration::Zif20),
        "zif40" | "40" => Ok(ZifGeneration::Zif40),
        _ => Err(format!("unknown socket {:?}, expected zif20 or zif40", s)),
    }
}

fn parse_chip_type(s: &str) -> Result<ChipType, String> {
    [
        ChipType::Logic,
        ChipType::Dram,
        ChipType::Sram,
        ChipType::Rom,
        ChipType::Fram,
        ChipType::Flash,
    ]
    .into_iter()
    .find(|t| t.name().eq_ignore_ascii_case(s))
    .ok_or_else(|| format!("unknown chip type {:?}", s))
}

/// Image file behind the tester's byte-stream interface.
struct FileStream {
    path: PathBuf,
    file: Option<File>,
}

impl FileStream {
    fn new(path: &Path) -> Self {
        FileStream {
            path: path.to_path_buf(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stream not open"))
    }
}

impl ByteStream for FileStream {
    fn open(&mut self, mode: StreamMode) -> rusty_ict::Result<()> {
        self.file = Some(match mode {
            StreamMode::Read => File::open(&self.path)?,
            StreamMode::Write => File::create(&self.path)?,
        });
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> rusty_ict::Result<usize> {
        Ok(self.file()?.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> rusty_ict::Result<()> {
        Ok(self.file()?.write_all(buf)?)
    }

    fn close(&mut self) -> rusty_ict::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Tester on a fresh bench with `part` mounted.
fn bench_tester(
    config: TesterConfig,
    part: &str,
    faults: &[Fault],
) -> rusty_ict::Result<Tester<Bench, VirtualClock>> {
    let clock = VirtualClock::new();
    let bench = Bench::new(config.socket, clock.clone());
    let mut tester = Tester::new(bench, clock, config)?;

    let family = match tester.database().identify_part(part) {
        Identification::Unique(id) => id,
        Identification::NoMatch => return Err(TesterError::NoMatch(part.to_string())),
        Identification::Ambiguous(ids) => {
            return Err(TesterError::Ambiguous {
                code: part.to_string(),
                families: tester.database().names(&ids),
            })
        }
    };
    let device = DeviceFactory::new().create(&tester.database()[family])?;
    let bench = tester.socket_mut().port_mut();
    bench.mount(device)?;
    for &fault in faults {
        bench.inject(fault);
    }
    Ok(tester)
}

fn paint(verdict: Verdict) -> StyledContent<&'static str> {
    let color = match verdict {
        Verdict::Good => Color::Green,
        Verdict::Bad => Color::Red,
        Verdict::Unreliable | Verdict::Mixed => Color::DarkYellow,
        Verdict::Skipped => Color::Grey,
    };
    verdict.name().with(color)
}

fn print_outcome(outcome: &TestOutcome) {
    println!("Family:   {}", outcome.family);
    println!("Verdict:  {}", paint(outcome.verdict));
    println!("Passed:   {:.2}%", outcome.percent_passed);
    println!("Cycles:   {} per pass, {} pass(es)", outcome.cycles, outcome.passes);
    for m in &outcome.mismatches {
        println!(
            "  vector {:3}  pin {:2}  expected {}  observed {}",
            m.vector, m.pin, m.expected, m.observed
        );
    }
}

fn run(cli: Cli) -> rusty_ict::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => TesterConfig::from_file(path)?,
        None => TesterConfig::default(),
    };
    if let Some(socket) = cli.socket {
        config.socket = socket;
    }

    match cli.command {
        Command::List => {
            let tester = Tester::new(
                Bench::new(config.socket, VirtualClock::new()),
                VirtualClock::new(),
                config,
            )?;
            for (_, profile) in tester.database().iter() {
                let codes: Vec<String> = profile.codes.iter().map(|c| c.to_string()).collect();
                println!(
                    "{:<12} {:<6} {:>2} pins  {:<32} {}",
                    profile.name,
                    profile.chip_type().name(),
                    profile.pin_count,
                    codes.join(","),
                    profile.description
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Identify { part, chip_type } => {
            let mut tester = bench_tester(config, &part, &[])?;
            let pins = tester
                .socket()
                .port()
                .device()
                .map_or(0, |device| device.pin_count());
            match tester.identify(&IcRecord::unknown(chip_type, pins))? {
                Identification::Unique(id) => {
                    println!("Identified: {}", tester.database()[id].name.to_string().green());
                    Ok(ExitCode::SUCCESS)
                }
                Identification::NoMatch => {
                    println!("{}", "No match".red());
                    Ok(ExitCode::FAILURE)
                }
                Identification::Ambiguous(ids) => {
                    let names = tester.database().names(&ids).join(", ");
                    println!("{} {}", "No unique match:".dark_yellow(), names);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Test {
            part,
            pattern,
            faults,
        } => {
            let mut tester = bench_tester(config, &part, &faults)?;
            let mut handle = tester.start_test(&IcRecord::from_code(&part), pattern)?;
            let outcome = loop {
                let progress = tester.poll_progress(&mut handle)?;
                if let Some(outcome) = progress.outcome {
                    break outcome;
                }
                debug!(
                    "{} of {} cycles, {} so far",
                    progress.cycles_done, progress.cycles_total, progress.verdict_so_far
                );
            };
            print_outcome(&outcome);
            if let Some(stats) = tester
                .socket()
                .port()
                .device()
                .and_then(|device| device.refresh_stats())
            {
                println!(
                    "Refresh:  longest gap {} us of {} us, {} rows decayed",
                    stats.max_gap_ns / 1_000,
                    stats.budget_ns / 1_000,
                    stats.decayed_rows
                );
            }
            Ok(if outcome.verdict == Verdict::Good {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Dump { part, out, preload } => {
            let mut tester = bench_tester(config, &part, &[])?;
            if let Some(path) = preload {
                let image = fs::read(path)?;
                if let Some(device) = tester.socket_mut().port_mut().device_mut() {
                    device.load(&image);
                }
            }
            let report = tester.dump(&IcRecord::from_code(&part), &mut FileStream::new(&out))?;
            println!("Dumped {} bytes to {}", report.bytes, out.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Program { part, image, erase } => {
            let mut tester = bench_tester(config, &part, &[])?;
            let ic = IcRecord::from_code(&part);
            if erase {
                let report = tester.erase(&ic)?;
                println!("Erase:    {} of {} bytes not blank", report.failures, report.bytes);
            }
            let report = tester.program(&ic, &mut FileStream::new(&image))?;
            println!("Program:  {} of {} bytes failed", report.failures, report.bytes);
            let verify = tester.verify(&ic, &mut FileStream::new(&image))?;
            println!("Verify:   {} of {} bytes differ", verify.failures, verify.bytes);
            Ok(if report.is_clean() && verify.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red(), e);
            ExitCode::FAILURE
        }
    }
}
