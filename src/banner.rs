use std::env;
use std::io::{self, Write};

fn banner_text(suffix: &str) -> String {
    let no_color = env::var("NO_COLOR").is_ok();
    let (c, r) = if no_color {
        ("", "")
    } else {
        ("\x1b[96m", "\x1b[0m")
    };
    let logo = concat!(
        "  ____          _ __  __                _ \n",
        " / ___|__ _  __| |  \\/  | ___ _ __   __| |\n",
        "| |   / _` |/ _` | |\\/| |/ _ \\ '_ \\ / _` |\n",
        "| |__| (_| | (_| | |  | |  __/ | | | (_| |\n",
        " \\____\\__,_|\\__,_|_|  |_|\\___|_| |_|\\__,_|\n",
    );
    format!("\n{c}{logo}{r}🔧 {suffix}\n")
}

pub fn print_banner() {
    let _ = io::stdout()
        .write_all(banner_text("CadMend CLI – repairs what the model broke").as_bytes());
}

pub fn print_banner_stderr() {
    let _ = io::stderr()
        .write_all(banner_text("CadMend CLI – repairs what the model broke").as_bytes());
}

pub fn print_server_banner() {
    let _ = io::stdout()
        .write_all(banner_text("CadMend API – repairs what the model broke").as_bytes());
}
