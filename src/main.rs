//! Interactive shell for the OS simulator.

use std::io::{self, BufRead, Write};

use csopesy::shell::{Outcome, Shell};

const BANNER: &str = r#"  _____   _____   ____   _____  ______  _____  __     __
 / ____| / ____| / __ \ |  __ \|  ____|/ ____| \ \   / /
| |     | (___  | |  | || |__) | |__  | (___    \ \_/ /
| |      \___ \ | |  | ||  ___/|  __|  \___ \    \   /
| |____  ____) || |__| || |    | |____ ____) |    | |
 \_____| |_____/ \____/ |_|    |______|_____/     |_|
"#;

fn clear_screen() {
    // ANSI clear + cursor home.
    print!("\x1B[2J\x1B[1;1H");
    let _ = io::stdout().flush();
}

fn main() {
    clear_screen();
    println!("{BANNER}");
    println!("Type 'help' to see available commands.");
    println!("Type 'initialize' to set up the system.\n");

    let mut shell = Shell::new();
    let stdin = io::stdin();

    loop {
        print!("Enter command: ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("input error: {e}");
                break;
            }
        }
        if input.trim().is_empty() {
            continue;
        }

        match shell.execute(&input) {
            Ok(Outcome::Text(text)) => println!("{text}"),
            Ok(Outcome::Clear) => {
                clear_screen();
                println!("{BANNER}");
            }
            Ok(Outcome::Exit(text)) => {
                println!("{text}");
                break;
            }
            Err(e) => println!("ERROR: {e}\n"),
        }
    }
}
