#![cfg(not(tarpaulin_include))]

use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use rekap_so::client::HttpApiClient;
use rekap_so::controller::{
    Controller, RekapForm, Render, Tab, ToastLevel, UiState, save_cost_inputs, switch_tab,
};
use rekap_so::logging;
use rekap_so::storage::FileStore;

const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_CACHE_DIR: &str = ".rekap-cache";

fn print_help() {
    println!("Commands:");
    println!("  q: Quit");
    println!("  health: Test the connection to the backend");
    println!("  sync: Reload items and refresh the dashboard");
    println!("  check-hpp: List items without HPP and ask for their costs");
    println!("  submit <yyyy-mm-dd> <shift> <operator> [so|rekonsiliasi|both]: Create a rekap");
    println!("  tab <dashboard|rekap|hpp|history|settings>: Switch tab");
    println!("  history: Show submitted rekaps");
    println!("  clear-cache: Remove every cached entry");
}

/// Print the instructions produced by the controller
fn render(renders: &[Render]) {
    for r in renders {
        match r {
            Render::Toast { message, level } => {
                let tag = match level {
                    ToastLevel::Info => "info",
                    ToastLevel::Success => "ok",
                    ToastLevel::Warning => "warn",
                    ToastLevel::Error => "error",
                };
                println!("[{}] {}", tag, message);
            }
            Render::CostPrompt { items } => {
                println!("{} item(s) need HPP:", items.len());
                for item in items {
                    println!("  {:<12} {}", item.plu, item.description);
                }
            }
            Render::MarkCostInput { plu, valid } if !valid => {
                println!("  invalid HPP for {}", plu);
            }
            Render::MarkCostInput { .. } | Render::HideModal => {}
            Render::CostConfirmation { entries } => {
                println!("HPP held for the next rekap:");
                for entry in entries {
                    println!("  {:<12} {:<30} {}", entry.plu, entry.description, entry.cost);
                }
            }
            Render::Dashboard {
                total_items,
                zero_cost_items,
                today_rekap,
            } => {
                println!(
                    "Items: {}  Zero HPP: {}  Rekap today: {}",
                    total_items, zero_cost_items, today_rekap
                );
            }
            Render::ConnectionStatus { online } => {
                println!("Status: {}", if *online { "Online" } else { "Offline" });
            }
            Render::ResetForm => {}
            Render::ActiveTab(tab) => println!("Tab: {:?}", tab),
        }
    }
}

/// Ask for a cost per pending item on stdin
fn read_costs(state: &UiState) -> io::Result<Vec<(String, String)>> {
    let mut inputs = Vec::with_capacity(state.pending.len());
    for item in &state.pending {
        print!("HPP for {} ({}): ", item.plu, item.description);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        inputs.push((item.plu.clone(), line.trim().to_string()));
    }
    Ok(inputs)
}

fn parse_tab(name: &str) -> Option<Tab> {
    match name {
        "dashboard" => Some(Tab::Dashboard),
        "rekap" => Some(Tab::Rekap),
        "hpp" => Some(Tab::Hpp),
        "history" => Some(Tab::History),
        "settings" => Some(Tab::Settings),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [api_url]", args[0]);
        return Ok(());
    }

    let api_url = args
        .get(1)
        .cloned()
        .or_else(|| env::var("REKAP_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let cache_dir = env::var("REKAP_CACHE_DIR").unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string());

    let api = Arc::new(HttpApiClient::new(&api_url, rekap_so::VERSION)?);
    let store = Arc::new(FileStore::open(&cache_dir)?);
    let controller = Controller::new(api, store);

    let (mut state, renders) = controller.init(UiState::default()).await;
    render(&renders);

    let mut start_time = Instant::now();
    let mut status = String::from("ok");
    loop {
        let elapsed_time = start_time.elapsed().as_secs_f64();
        print!("[{:.1}] ({}) > ", elapsed_time, status);
        io::stdout().flush()?;

        let mut command = String::new();
        if io::stdin().read_line(&mut command)? == 0 {
            break;
        }
        let command = command.trim();
        start_time = Instant::now();

        let words: Vec<&str> = command.split_whitespace().collect();
        let Some(&name) = words.first() else {
            status = String::from("invalid command");
            continue;
        };

        let (next, renders) = match name {
            "q" => break,
            "help" => {
                print_help();
                continue;
            }
            "health" => controller.test_connection(state).await,
            "sync" => controller.sync(state).await,
            "clear-cache" => controller.clear_cache(state).await,
            "check-hpp" => {
                let (next, renders) = controller.check_costs(state).await;
                if next.pending.is_empty() {
                    (next, renders)
                } else {
                    render(&renders);
                    let inputs = read_costs(&next)?;
                    save_cost_inputs(next, &inputs)
                }
            }
            "submit" if words.len() >= 4 => {
                let form = RekapForm {
                    date: words[1].to_string(),
                    shift: words[2].to_string(),
                    operator: words[3].to_string(),
                    kind: words.get(4).unwrap_or(&"so").to_string(),
                };
                let (next, renders) = controller.submit(state, &form).await;
                if next.pending.is_empty() {
                    (next, renders)
                } else {
                    render(&renders);
                    let inputs = read_costs(&next)?;
                    let (next, renders) = save_cost_inputs(next, &inputs);
                    render(&renders);
                    println!("Run submit again to create the rekap with these costs");
                    (next, Vec::new())
                }
            }
            "tab" if words.len() == 2 => match parse_tab(words[1]) {
                Some(tab) => switch_tab(state, tab),
                None => {
                    status = String::from("unknown tab");
                    continue;
                }
            },
            "history" => {
                for entry in &state.history {
                    println!(
                        "{} shift {} {} ({}) {}",
                        entry.date, entry.shift, entry.operator, entry.kind, entry.message
                    );
                }
                (state, Vec::new())
            }
            _ => {
                status = String::from("invalid command");
                continue;
            }
        };

        render(&renders);
        state = next;
        status = String::from("ok");
    }

    Ok(())
}
