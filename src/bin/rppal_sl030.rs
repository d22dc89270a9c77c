use core::fmt::Arguments;
use rppal_sl030::{error, RppalSl030Log, RppalSl030Tool};
use std::cell::Cell;
use termion::color;

struct RppalSl030Logger {
    color: Cell<bool>,
}

impl RppalSl030Logger {
    fn new() -> RppalSl030Logger {
        RppalSl030Logger {
            color: Cell::new(true),
        }
    }

    fn report<C: color::Color>(self: &Self, label: &str, fg: C, args: Arguments) {
        if self.color.get() {
            eprintln!(
                "{}{}: {}{}",
                color::Fg(fg),
                label,
                args,
                color::Fg(color::Reset)
            );
        } else {
            eprintln!("{}: {}", label, args);
        }
    }
}

impl RppalSl030Log for RppalSl030Logger {
    fn output(self: &Self, args: Arguments) {
        println!("{}", args);
    }
    fn warning(self: &Self, args: Arguments) {
        self.report("warning", color::Yellow, args);
    }
    fn error(self: &Self, args: Arguments) {
        self.report("error", color::Red, args);
    }
    fn set_color(self: &Self, enabled: bool) {
        self.color.set(enabled);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let logger = RppalSl030Logger::new();

    if let Err(error) = RppalSl030Tool::new(&logger).run(std::env::args_os()) {
        error!(logger, "{}", error);
        std::process::exit(1);
    }
}
