//! Serial-backed leveled logger, grounded in the teacher kernel's
//! `logger.rs`. The framebuffer half of that module is dropped along with
//! graphics output (out of scope); everything else — color-by-level,
//! per-CPU tag, CRLF translation — is kept.

use core::fmt::Write;
use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;
use uart_16550::SerialPort;
use unicode_segmentation::UnicodeSegmentation;

struct KernelLogger {
    serial: spin::Mutex<SerialPort>,
}

static LOGGER: KernelLogger = KernelLogger {
    serial: spin::Mutex::new(unsafe { SerialPort::new(0x3f8) }),
};

enum Color {
    Default,
    Gray,
    BrightRed,
    BrightYellow,
    BrightBlue,
    BrightCyan,
    BrightMagenta,
}

impl KernelLogger {
    fn write_with_color(&self, port: &mut SerialPort, color: Color, args: core::fmt::Arguments) {
        let mut writer = WriterWithCr::new(port);
        match color {
            Color::Default => { let _ = write!(writer, "{args}"); }
            Color::Gray => { let _ = write!(writer, "{}", args.dimmed()); }
            Color::BrightRed => { let _ = write!(writer, "{}", args.bright_red()); }
            Color::BrightYellow => { let _ = write!(writer, "{}", args.bright_yellow()); }
            Color::BrightBlue => { let _ = write!(writer, "{}", args.bright_blue()); }
            Color::BrightCyan => { let _ = write!(writer, "{}", args.bright_cyan()); }
            Color::BrightMagenta => { let _ = write!(writer, "{}", args.bright_magenta()); }
        }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let mut port = self.serial.lock();
        let level = record.level();
        self.write_with_color(
            &mut port,
            match level {
                Level::Error => Color::BrightRed,
                Level::Warn => Color::BrightYellow,
                Level::Info => Color::BrightBlue,
                Level::Debug => Color::BrightCyan,
                Level::Trace => Color::BrightMagenta,
            },
            format_args!("{level:5} "),
        );
        let cpu_id = crate::arch::cpu_local::try_get_local().map_or(0, |local| local.kernel_id);
        self.write_with_color(&mut port, Color::Gray, format_args!("[{cpu_id:02}] "));
        self.write_with_color(&mut port, Color::Default, *record.args());
        self.write_with_color(&mut port, Color::Default, format_args!("\n"));
    }

    fn flush(&self) {}
}

pub fn init() -> Result<(), log::SetLoggerError> {
    LOGGER.serial.lock().init();
    log::set_max_level(LevelFilter::Trace);
    log::set_logger(&LOGGER)
}

struct WriterWithCr<'a> {
    inner: &'a mut SerialPort,
}

impl<'a> WriterWithCr<'a> {
    fn new(inner: &'a mut SerialPort) -> Self {
        Self { inner }
    }
}

impl Write for WriterWithCr<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for grapheme in s.graphemes(true) {
            if grapheme == "\n" {
                self.inner.write_str("\r\n")?;
            } else {
                self.inner.write_str(grapheme)?;
            }
        }
        Ok(())
    }
}
