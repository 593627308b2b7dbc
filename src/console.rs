// src/console.rs

use std::fmt::Write as FmtWrite;
use std::io::{Write, stdout};
use std::str::{FromStr, SplitWhitespace};

use crossterm::style::Stylize;
use thiserror::Error;
use tracing::warn;

use crate::config::DistanceMetric;
use crate::contour::Point;
use crate::decoder;
use crate::engine::{ClearEvent, DisplayDistance, PointDistance, RegionMarker, RegionStep};
use crate::error::EngineError;
use crate::harmonics::{self, Toggled};
use crate::session::Workspace;
use crate::spectrogram::{Spectrogram, SpectrogramView};

/// Virtual display used to map clicks when the metric is in pixels.
pub const DISPLAY_SIZE: (f64, f64) = (1200.0, 600.0);

pub const HELP: &str = "\
  a T F    add point at T seconds, F Hz
  c T F    ctrl-click region corner (onset, then offset)
  r T F    remove nearest point
  pk T     add point at the loudest frequency at T
  f0 [T]   estimate the fundamental (whole file, or the frame at T)
  ha K     add harmonic K (K x f0)
  hr K     remove harmonic K
  ht K     toggle harmonic K
  hx       clear harmonics (keeps H1)
  f        finish contour
  u        clear previous (last point, else reopen last contour)
  x        clear all
  n / p    next / previous file
  j N      jump to file N
  k REASON mark file unusable and move on
  g        go to next unannotated file
  s        save
  l        list contours
  i        directory statistics
  h        help
  q        quit (saves)";

// ==========================================
// COMMAND PARSING
// ==========================================

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add { time: f64, freq: f64 },
    Corner { time: f64, freq: f64 },
    Remove { time: f64, freq: f64 },
    Peak { time: f64 },
    Fundamental { time: Option<f64> },
    AddHarmonic(u32),
    RemoveHarmonic(u32),
    ToggleHarmonic(u32),
    ClearHarmonics,
    Finish,
    ClearPrevious,
    ClearAll,
    Next,
    Previous,
    Jump(usize),
    Skip(String),
    NextUnannotated,
    Save,
    List,
    Stats,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (h for help)")]
    Unknown(String),
    #[error("'{command}' needs {what}")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },
    #[error("'{0}' is not a number")]
    BadNumber(String),
}

fn number<T: FromStr>(
    arg: Option<&str>,
    command: &'static str,
    what: &'static str,
) -> Result<T, ParseCommandError> {
    let raw = arg.ok_or(ParseCommandError::MissingArgument { command, what })?;
    raw.parse()
        .map_err(|_| ParseCommandError::BadNumber(raw.to_string()))
}

fn time_freq(
    words: &mut SplitWhitespace<'_>,
    command: &'static str,
) -> Result<(f64, f64), ParseCommandError> {
    let what = "a time and a frequency";
    let time = number(words.next(), command, what)?;
    let freq = number(words.next(), command, what)?;
    Ok((time, freq))
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ParseCommandError::Empty);
        };

        let cmd = match head.to_ascii_lowercase().as_str() {
            "a" | "add" => {
                let (time, freq) = time_freq(&mut words, "a")?;
                Command::Add { time, freq }
            }
            "c" | "corner" => {
                let (time, freq) = time_freq(&mut words, "c")?;
                Command::Corner { time, freq }
            }
            "r" | "remove" => {
                let (time, freq) = time_freq(&mut words, "r")?;
                Command::Remove { time, freq }
            }
            "pk" | "peak" => Command::Peak {
                time: number(words.next(), "pk", "a time")?,
            },
            "f0" => Command::Fundamental {
                time: match words.next() {
                    Some(t) => Some(number(Some(t), "f0", "a time")?),
                    None => None,
                },
            },
            "ha" => Command::AddHarmonic(number(words.next(), "ha", "a harmonic number")?),
            "hr" => Command::RemoveHarmonic(number(words.next(), "hr", "a harmonic number")?),
            "ht" => Command::ToggleHarmonic(number(words.next(), "ht", "a harmonic number")?),
            "hx" => Command::ClearHarmonics,
            "f" | "finish" => Command::Finish,
            "u" | "undo" => Command::ClearPrevious,
            "x" | "clear" => Command::ClearAll,
            "n" | "next" => Command::Next,
            "p" | "prev" => Command::Previous,
            "j" | "jump" => Command::Jump(number(words.next(), "j", "a file number")?),
            "k" | "skip" => {
                let reason = line.trim_start()[head.len()..].trim();
                Command::Skip(reason.to_string())
            }
            "g" | "goto" => Command::NextUnannotated,
            "s" | "save" => Command::Save,
            "l" | "list" => Command::List,
            "i" | "stats" => Command::Stats,
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" => Command::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(cmd)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ==========================================
// CONSOLE
// ==========================================

/// Line-driven annotation front end over a `Workspace`.
pub struct Console {
    workspace: Workspace,
    spectrogram: Option<Spectrogram>,
    view: Option<SpectrogramView>,

    // Reusable buffer for the status block.
    draw_buffer: String,
}

impl Console {
    pub fn new(workspace: Workspace) -> Self {
        let mut console = Self {
            workspace,
            spectrogram: None,
            view: None,
            draw_buffer: String::with_capacity(1024),
        };
        console.load_current();
        console
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn into_workspace(self) -> Workspace {
        self.workspace
    }

    pub fn view(&self) -> Option<&SpectrogramView> {
        self.view.as_ref()
    }

    /// Decodes the active file and rebuilds the spectrogram and its view.
    fn load_current(&mut self) {
        let (width, height) = DISPLAY_SIZE;
        let path = self.workspace.current_file().to_path_buf();
        match decoder::load_audio(&path) {
            Ok(clip) => {
                let params = *self.workspace.session().params();
                let spec = Spectrogram::compute(&clip.samples, clip.sample_rate, &params);
                self.view = Some(SpectrogramView::for_spectrogram(
                    &spec,
                    clip.duration(),
                    width,
                    height,
                ));
                self.spectrogram = Some(spec);
                self.workspace.session_mut().set_meta(clip.meta());
            }
            Err(e) => {
                warn!("could not decode {}: {e}", path.display());
                let meta = self.workspace.session().meta();
                self.spectrogram = None;
                self.view = meta.is_known().then(|| {
                    SpectrogramView::new(
                        width,
                        height,
                        (0.0, meta.duration),
                        (0.0, meta.sample_rate as f64 / 2.0),
                    )
                });
            }
        }
    }

    fn in_view(&self, time: f64, freq: f64) -> bool {
        let Some(view) = &self.view else {
            return true;
        };
        let inside = view.contains(Point::new(time, freq));
        if !inside {
            println!("⚠ t={time:.3}s, f={freq:.0}Hz is outside the spectrogram; ignored");
        }
        inside
    }

    fn report(result: Result<(), EngineError>) {
        if let Err(e) = result {
            println!("⚠ {e}");
        }
    }

    /// Prints a failed file operation and keeps the current state.
    fn recover<T, E: std::fmt::Display>(result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                println!("⚠ {e}");
                None
            }
        }
    }

    /// Runs one command. File errors are printed and the console stays on
    /// the current file with its edits intact.
    pub fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Add { time, freq } => {
                if self.in_view(time, freq) {
                    Self::report(self.workspace.session_mut().add_point(time, freq));
                }
            }
            Command::Corner { time, freq } => {
                if self.in_view(time, freq) {
                    match self.workspace.session_mut().mark_region_corner(time, freq) {
                        Ok(RegionStep::OnsetMarked(p)) => println!("▶ Onset marked at {p}; c T F for the offset"),
                        Ok(RegionStep::Extracted { points, remaining }) => {
                            println!("✓ Created contour with {points} points, {remaining} points remaining")
                        }
                        Err(e) => println!("⚠ {e}"),
                    }
                }
            }
            Command::Remove { time, freq } => self.remove_nearby(time, freq),
            Command::Peak { time } => {
                let peak = self
                    .spectrogram
                    .as_ref()
                    .and_then(|spec| spec.peak_frequency_at(time));
                match peak {
                    Some(freq) if self.in_view(time, freq) => {
                        Self::report(self.workspace.session_mut().add_point(time, freq))
                    }
                    Some(_) => {}
                    None => println!("⚠ no spectrogram loaded for this file"),
                }
            }
            Command::Fundamental { time } => self.estimate_fundamental(time),
            Command::AddHarmonic(k) => match self.workspace.session_mut().add_harmonic(k) {
                Ok(freq) => println!("✓ H{k} at {freq:.1} Hz"),
                Err(e) => println!("⚠ {e}"),
            },
            Command::RemoveHarmonic(k) => match self.workspace.session_mut().remove_harmonic(k) {
                Ok(()) => println!("✓ Removed H{k}"),
                Err(e) => println!("⚠ {e}"),
            },
            Command::ToggleHarmonic(k) => match self.workspace.session_mut().toggle_harmonic(k) {
                Ok(Toggled::Added(h)) => println!("✓ H{k} at {:.1} Hz", h.frequency),
                Ok(Toggled::Removed(_)) => println!("✓ Removed H{k}"),
                Err(e) => println!("⚠ {e}"),
            },
            Command::ClearHarmonics => {
                let n = self.workspace.session_mut().clear_harmonics();
                println!("✓ Cleared {n} harmonic(s)");
            }
            Command::Finish => match self.workspace.session_mut().finish_contour() {
                Ok(n) => println!("✓ Contour complete with {n} points"),
                Err(e) => println!("⚠ {e}"),
            },
            Command::ClearPrevious => match self.workspace.session_mut().clear_previous() {
                Ok(event) => {
                    match &event {
                        ClearEvent::RemovedPoint(p) => println!("↺ {}: {p}", event.name()),
                        ClearEvent::ReopenedContour(c) => {
                            println!("↺ {}: {} points back in the open contour", event.name(), c.len())
                        }
                    }
                    self.print_history();
                }
                Err(e) => println!("⚠ {e}"),
            },
            Command::ClearAll => self.workspace.session_mut().clear_all(),
            Command::Next => {
                if Self::recover(self.workspace.next()).is_some() {
                    self.load_current();
                }
            }
            Command::Previous => {
                if Self::recover(self.workspace.previous()).is_some() {
                    self.load_current();
                }
            }
            Command::Jump(n) => {
                if Self::recover(self.workspace.jump_to(n)).is_some() {
                    self.load_current();
                }
            }
            Command::Skip(reason) => {
                if Self::recover(self.workspace.skip_current(&reason)).is_some() {
                    self.load_current();
                }
            }
            Command::NextUnannotated => match Self::recover(self.workspace.goto_next_unannotated()) {
                Some(Some(i)) => {
                    println!("✓ Found unannotated file {}", i + 1);
                    self.load_current();
                }
                Some(None) => println!("No unannotated or unusable files left."),
                None => {}
            },
            Command::Save => {
                if Self::recover(self.workspace.session_mut().save()).is_some() {
                    println!("✓ Saved");
                }
            }
            Command::List => self.print_contours(),
            Command::Stats => self.print_stats(),
            Command::Help => println!("{HELP}"),
            Command::Quit => {
                if Self::recover(self.workspace.flush()).is_none() {
                    println!("⚠ Not quitting with unsaved changes; fix the problem and quit again");
                    return Flow::Continue;
                }
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    fn estimate_fundamental(&mut self, time: Option<f64>) {
        let Some(spec) = &self.spectrogram else {
            println!("⚠ no spectrogram loaded for this file");
            return;
        };
        let search = self.workspace.config().harmonics.search();
        match harmonics::estimate_fundamental(spec, time, &search) {
            Some(f0) => match self.workspace.session_mut().set_fundamental(f0) {
                Ok(()) => println!("✓ f0 = {f0:.1} Hz (H1)"),
                Err(e) => println!("⚠ {e}"),
            },
            None => println!(
                "⚠ no peak between {:.0} and {:.0} Hz",
                search.min_hz, search.max_hz
            ),
        }
    }

    /// Clear Previous steps remembered for this file, newest first.
    fn print_history(&self) {
        let history = self.workspace.session().engine().history();
        let names: Vec<&str> = history.iter().map(ClearEvent::name).collect();
        println!(
            "  history ({}/{}): {}",
            history.len(),
            history.max_depth(),
            names.join(", ")
        );
    }

    fn remove_nearby(&mut self, time: f64, freq: f64) {
        let removal = self.workspace.config().removal;
        let scaled = removal.scaled_distance();
        let display = self.view.as_ref().map(DisplayDistance::new);
        let metric: &dyn PointDistance = match (removal.metric, &display) {
            (DistanceMetric::Display, Some(d)) => d,
            _ => &scaled,
        };

        if !self
            .workspace
            .session_mut()
            .remove_nearby(time, freq, removal.threshold, metric)
        {
            println!("No point within {} of t={time:.3}s, f={freq:.0}Hz", removal.threshold);
        }
    }

    fn print_contours(&self) {
        let session = self.workspace.session();
        let engine = session.engine();
        if let Some(f0) = session.harmonics().fundamental() {
            println!("Harmonics (f0 = {f0:.1} Hz):");
            for h in session.harmonics().harmonics() {
                println!("    H{:<3} {:.1} Hz", h.harmonic_num, h.frequency);
            }
        }
        if engine.is_empty() {
            println!("(no annotations)");
            return;
        }
        for (i, contour) in engine.finished().iter().enumerate() {
            let s = contour.syllable();
            println!(
                "Contour {}: {:.3}-{:.3}s, {:.0}-{:.0}Hz, {} points",
                i + 1,
                s.t_onset,
                s.t_offset,
                s.f_min,
                s.f_max,
                contour.len()
            );
            for (p, role) in contour.labeled() {
                println!("    {:<11} {p}", role.as_str());
            }
        }
        if !engine.current().is_empty() {
            println!("Open contour ({} points, click order):", engine.current().len());
            for p in engine.current() {
                println!("    {p}");
            }
        }
    }

    fn print_stats(&self) {
        let ws = &self.workspace;
        let remaining = ws
            .statuses()
            .iter()
            .filter(|s| s.needs_annotation())
            .count();
        println!(
            "{} files | {} syllables | {} unusable | {} still need annotation",
            ws.len(),
            ws.total_syllables(),
            ws.unusable_count(),
            remaining
        );
    }

    /// Writes the status block for the active file.
    pub fn render_status(&mut self) -> anyhow::Result<()> {
        let ws = &self.workspace;
        let session = ws.session();
        let engine = session.engine();
        let (open, saved) = engine.point_counts();

        self.draw_buffer.clear();
        let name = ws
            .current_file()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let _ = write!(
            self.draw_buffer,
            "\n{} {}",
            format!("[{}/{}]", ws.current_index() + 1, ws.len()).bold(),
            name
        );
        if session.has_changes() {
            let _ = write!(self.draw_buffer, "{}", " *".yellow());
        }
        if session.is_unusable() {
            let reason = session.skip_reason().unwrap_or("no reason");
            let _ = write!(self.draw_buffer, " {}", format!("UNUSABLE ({reason})").red());
        }
        if session.needs_review() {
            let _ = write!(self.draw_buffer, " {}", "NEEDS REVIEW".red().bold());
        }

        let _ = write!(
            self.draw_buffer,
            "\n  contours: {} ({saved} pts) | open: {open} pts",
            engine.finished().len()
        );
        if let RegionMarker::AwaitingSecond { onset } = engine.region_marker() {
            let _ = write!(self.draw_buffer, " | onset pending at {}", onset.to_string().cyan());
        }
        if let Some(f0) = session.harmonics().fundamental() {
            let _ = write!(
                self.draw_buffer,
                " | f0 {f0:.0} Hz, {} harmonic(s)",
                session.harmonics().harmonics().len()
            );
        }
        if let Some(event) = engine.history().last() {
            let _ = write!(self.draw_buffer, " | last clear: {}", event.name().dim());
        }
        let meta = session.meta();
        if meta.is_known() {
            let _ = write!(
                self.draw_buffer,
                " | {:.2}s @ {} Hz",
                meta.duration, meta.sample_rate
            );
        }
        let _ = write!(self.draw_buffer, "\n> ");

        let mut out = stdout();
        out.write_all(self.draw_buffer.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_point_commands() {
        assert_eq!(
            "a 0.25 3500".parse::<Command>().unwrap(),
            Command::Add {
                time: 0.25,
                freq: 3500.0
            }
        );
        assert_eq!(
            "C 1 2".parse::<Command>().unwrap(),
            Command::Corner {
                time: 1.0,
                freq: 2.0
            }
        );
        assert_eq!("pk 0.5".parse::<Command>().unwrap(), Command::Peak { time: 0.5 });
    }

    #[test]
    fn skip_keeps_the_whole_reason() {
        assert_eq!(
            "k  too much wind noise ".parse::<Command>().unwrap(),
            Command::Skip("too much wind noise".into())
        );
        assert_eq!("k".parse::<Command>().unwrap(), Command::Skip(String::new()));
    }

    #[test]
    fn reports_missing_and_bad_arguments() {
        assert_eq!(
            "a 0.1".parse::<Command>().unwrap_err(),
            ParseCommandError::MissingArgument {
                command: "a",
                what: "a time and a frequency"
            }
        );
        assert_eq!(
            "j two".parse::<Command>().unwrap_err(),
            ParseCommandError::BadNumber("two".into())
        );
        assert_eq!("   ".parse::<Command>().unwrap_err(), ParseCommandError::Empty);
        assert!(matches!(
            "zz".parse::<Command>(),
            Err(ParseCommandError::Unknown(_))
        ));
    }

    #[test]
    fn parses_harmonic_commands() {
        assert_eq!(
            "f0".parse::<Command>().unwrap(),
            Command::Fundamental { time: None }
        );
        assert_eq!(
            "f0 0.4".parse::<Command>().unwrap(),
            Command::Fundamental { time: Some(0.4) }
        );
        assert_eq!("ha 3".parse::<Command>().unwrap(), Command::AddHarmonic(3));
        assert_eq!("ht 2".parse::<Command>().unwrap(), Command::ToggleHarmonic(2));
        assert_eq!(
            "hr -1".parse::<Command>().unwrap_err(),
            ParseCommandError::BadNumber("-1".into())
        );
        assert_eq!(
            "ha".parse::<Command>().unwrap_err(),
            ParseCommandError::MissingArgument {
                command: "ha",
                what: "a harmonic number"
            }
        );
    }

    #[test]
    fn single_letter_navigation() {
        assert_eq!("n".parse::<Command>().unwrap(), Command::Next);
        assert_eq!("p".parse::<Command>().unwrap(), Command::Previous);
        assert_eq!("j 3".parse::<Command>().unwrap(), Command::Jump(3));
        assert_eq!("g".parse::<Command>().unwrap(), Command::NextUnannotated);
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }
}
