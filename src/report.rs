//! Report rendering: screen-ls, report-util, vmstat, memory map, and
//! process-smi.
//!
//! Everything here renders to a `String`; the shell decides whether that
//! goes to the terminal or a file. Renderers only use snapshot queries, so
//! they take each lock briefly and never stall the executor for the
//! duration of a print.

use std::io;
use std::path::Path;

use crate::clock;
use crate::mem::{AllocKind, MemoryManager};
use crate::process::ProcessSnapshot;
use crate::sched::Scheduler;

fn compact_line(p: &ProcessSnapshot) -> String {
    let core = match p.core {
        Some(c) => c.to_string(),
        None => "N/A".to_string(),
    };
    format!(
        "{} | Core: {} | {}/{} | {}",
        p.name, core, p.executed, p.total, p.state
    )
}

/// The `screen-ls` view: running processes, queue depth, and the last ten
/// finished processes.
pub fn screen_ls(sched: &Scheduler) -> String {
    let mut out = String::new();
    out.push_str("\n========== PROCESS STATUS ==========\n\n");

    out.push_str("Running Processes:\n");
    let running = sched.running_snapshot();
    if running.is_empty() {
        out.push_str("  (None)\n");
    } else {
        for p in &running {
            out.push_str("  ");
            out.push_str(&compact_line(p));
            out.push('\n');
        }
    }

    out.push_str(&format!(
        "\nReady Queue (Size: {}):\n",
        sched.ready_queue_len()
    ));
    if sched.ready_queue_len() == 0 {
        out.push_str("  (Empty)\n");
    } else {
        out.push_str(&format!("  {} processes waiting\n", sched.ready_queue_len()));
    }

    let finished = sched.finished_snapshot();
    out.push_str(&format!(
        "\nFinished Processes (Total: {}):\n",
        finished.len()
    ));
    if finished.is_empty() {
        out.push_str("  (None)\n");
    } else {
        let start = finished.len().saturating_sub(10);
        for p in &finished[start..] {
            out.push_str("  ");
            out.push_str(&compact_line(p));
            out.push('\n');
        }
        if finished.len() > 10 {
            out.push_str("  ... (showing last 10)\n");
        }
    }

    out.push_str("\n====================================\n");
    out
}

/// The `report-util` CPU view.
pub fn utilization_report(sched: &Scheduler) -> String {
    let mut out = String::new();
    out.push_str("\n========== UTILIZATION REPORT ==========\n");
    out.push_str(&format!(
        "CPU Utilization: {:.2}%\n",
        sched.cpu_utilization() * 100.0
    ));
    out.push_str(&format!(
        "Cores Used: {}/{}\n",
        sched.active_cores(),
        sched.total_cores()
    ));
    out.push_str(&format!("Running Time: {} seconds\n", sched.elapsed_seconds()));
    out.push_str(&format!("Current Cycle: {}\n", sched.current_cycle()));
    out.push_str("\nProcess Statistics:\n");
    out.push_str(&format!("  Total Created: {}\n", sched.total_created()));
    out.push_str(&format!(
        "  Currently Running: {}\n",
        sched.running_snapshot().len()
    ));
    out.push_str(&format!("  In Ready Queue: {}\n", sched.ready_queue_len()));
    out.push_str(&format!("  Finished: {}\n", sched.finished_snapshot().len()));
    out.push_str("========================================\n");
    out
}

/// Compact memory statistics for the report file.
pub fn memory_snapshot(mem: &MemoryManager) -> String {
    let s = mem.stats();
    let mut out = String::new();
    out.push_str("Memory Statistics:\n");
    out.push_str(&format!("Total Memory: {} KB\n", s.total_kb));
    out.push_str(&format!("Used Memory: {} KB\n", s.used_kb));
    out.push_str(&format!("Free Memory: {} KB\n", s.free_kb));
    out.push_str(&format!("Utilization: {:.2}%\n", s.utilization_pct));
    out.push_str(&format!("Active Processes: {}\n", s.active_processes));
    if s.kind == AllocKind::Paging {
        out.push_str(&format!("Pages Used: {}/{}\n", s.used_frames, s.total_frames));
        out.push_str(&format!("Pages Paged Out: {}\n", s.pages_paged_out));
        out.push_str(&format!("Pages Paged In: {}\n", s.pages_paged_in));
    }
    out
}

/// Full `vmstat` dump.
pub fn vmstat(mem: &MemoryManager) -> String {
    let s = mem.stats();
    let mut out = String::new();
    out.push_str("\n========================================\n");
    out.push_str("VM STATISTICS\n");
    out.push_str("========================================\n\n");

    out.push_str("Memory Overview:\n");
    out.push_str(&format!("Total Memory: {} KB\n", s.total_kb));
    out.push_str(&format!("Used Memory: {} KB\n", s.used_kb));
    out.push_str(&format!("Free Memory: {} KB\n", s.free_kb));
    out.push_str(&format!("Utilization: {:.2}%\n\n", s.utilization_pct));

    out.push_str("Process Statistics:\n");
    out.push_str(&format!("Active Processes: {}\n", s.active_processes));
    out.push_str(&format!("Allocation Failures: {}\n\n", s.allocation_failures));

    match s.kind {
        AllocKind::Paging => {
            out.push_str("Paging Information:\n");
            out.push_str(&format!("Total Frames: {}\n", s.total_frames));
            out.push_str(&format!("Used Frames: {}\n", s.used_frames));
            out.push_str(&format!("Free Frames: {}\n", s.free_frames));
            out.push_str(&format!("Frame Size: {} KB\n", s.frame_kb));
            out.push_str(&format!("Pages Paged In: {}\n", s.pages_paged_in));
            out.push_str(&format!("Pages Paged Out: {}\n", s.pages_paged_out));
            out.push_str(&format!(
                "Internal Fragmentation: {} KB\n\n",
                s.internal_frag_kb
            ));

            if s.per_process.is_empty() {
                out.push_str("No processes currently allocated in memory.\n");
            } else {
                out.push_str("Memory Allocations:\n");
                out.push_str("PID\tProcess Name\t\tFrames\tMemory (KB)\n");
                out.push_str("---\t------------\t\t------\t-----------\n");
                for (pid, name, frames, kb) in &s.per_process {
                    let mut name = name.clone();
                    if name.len() > 20 {
                        name.truncate(17);
                        name.push_str("...");
                    }
                    out.push_str(&format!("{pid}\t{name:<20}\t{frames}\t{kb}\n"));
                }
            }
        }
        AllocKind::Flat => {
            out.push_str(&format!("Memory Blocks: {}\n", s.block_count));
            out.push_str(&format!(
                "External Fragmentation: {} KB\n",
                s.external_frag_kb
            ));
        }
    }

    out.push_str("\n========================================\n");
    out
}

/// Frame-by-frame (or block-by-block) memory map. Frames are truncated to
/// the first twenty.
pub fn memory_map(mem: &MemoryManager) -> String {
    let s = mem.stats();
    let mut out = String::new();
    out.push_str("\n========== MEMORY MAP ==========\n");

    match s.kind {
        AllocKind::Paging => {
            out.push_str("Allocation Type: Paging\n");
            out.push_str(&format!("Frame Size: {} KB\n", s.frame_kb));
            out.push_str(&format!("Total Frames: {}\n", s.total_frames));
            out.push_str(&format!("Used Frames: {}\n", s.used_frames));
            out.push_str(&format!("Free Frames: {}\n\n", s.free_frames));

            let frames = mem.frames_snapshot();
            for frame in frames.iter().take(20) {
                if frame.free {
                    out.push_str(&format!("Frame {:3}: [FREE]\n", frame.index));
                } else {
                    let pid = frame.owner.map(|p| p.to_string()).unwrap_or_default();
                    out.push_str(&format!(
                        "Frame {:3}: [{} (PID:{})]\n",
                        frame.index, frame.owner_name, pid
                    ));
                }
            }
            if frames.len() > 20 {
                out.push_str(&format!(
                    "... (showing first 20 of {} frames)\n",
                    frames.len()
                ));
            }
        }
        AllocKind::Flat => {
            out.push_str("Allocation Type: Flat\n");
            out.push_str(&format!("Strategy: {}\n\nMemory Blocks:\n", s.strategy));
            for block in mem.blocks_snapshot() {
                let end = block.start + block.size - 1;
                if block.free {
                    out.push_str(&format!(
                        "Address {:6} - {:6} ({:5} KB): [FREE]\n",
                        block.start, end, block.size
                    ));
                } else {
                    let pid = block.owner.map(|p| p.to_string()).unwrap_or_default();
                    out.push_str(&format!(
                        "Address {:6} - {:6} ({:5} KB): [{} (PID:{})]\n",
                        block.start, end, block.size, block.owner_name, pid
                    ));
                }
            }
        }
    }

    out.push_str("================================\n");
    out
}

/// The `process-smi` overview: CPU plus memory at a glance, with one row
/// per allocated process.
pub fn process_smi(sched: &Scheduler, mem: &MemoryManager) -> String {
    let s = mem.stats();
    let mut out = String::new();
    out.push_str("\n========== PROCESS-SMI ==========\n");
    out.push_str(&format!(
        "CPU Utilization: {:.2}%\n",
        sched.cpu_utilization() * 100.0
    ));
    out.push_str(&format!("Memory Usage: {} KB / {} KB\n", s.used_kb, s.total_kb));
    out.push_str(&format!("Memory Utilization: {:.2}%\n", s.utilization_pct));
    out.push_str("---------------------------------\n");
    if s.per_process.is_empty() {
        out.push_str("No processes allocated in memory.\n");
    } else {
        out.push_str("Processes in memory:\n");
        for (_, name, _, kb) in &s.per_process {
            out.push_str(&format!("  {name} {kb} KB\n"));
        }
    }
    out.push_str("=================================\n");
    out
}

/// The `screen -r` view: one process in detail, including the log tail.
pub fn process_detail(sched: &Scheduler, mem: &MemoryManager, name: &str) -> Option<String> {
    let view = sched.smi_view(name, 10)?;
    let p = &view.snapshot;
    let mut out = String::new();

    out.push_str(&format!("\nProcess: {}\n", p.name));
    out.push_str(&format!("ID: {}\n", p.pid));
    out.push_str(&format!("State: {}\n", p.state));
    out.push_str(&format!("Instructions: {}/{}\n", p.executed, p.total));
    out.push_str(&format!("Progress: {:.2}%\n", p.progress()));
    if !p.arrival.is_empty() {
        out.push_str(&format!("Arrival Time: {}\n", p.arrival));
    }
    if !p.start.is_empty() {
        out.push_str(&format!("Start Time: {}\n", p.start));
    }
    if !p.finish.is_empty() {
        out.push_str(&format!("Finish Time: {}\n", p.finish));
    }
    if let Some(core) = p.core {
        out.push_str(&format!("Core: {core}\n"));
    }

    if let Some(record) = mem.record(p.pid) {
        out.push_str(&format!(
            "Memory: {} KB requested, {} KB allocated, {} pages\n",
            record.requested_kb, record.allocated_kb, record.pages
        ));
    }

    if !view.log_tail.is_empty() {
        out.push_str("Recent log:\n");
        for line in &view.log_tail {
            out.push_str(&format!("  {line}\n"));
        }
    }

    Some(out)
}

/// Write the `report-util` file: CPU report, process lists, and memory
/// statistics, stamped with the generation time.
pub fn write_report(
    sched: &Scheduler,
    mem: &MemoryManager,
    path: impl AsRef<Path>,
) -> io::Result<()> {
    let mut out = String::new();
    out.push_str(&format!("Report generated: {}\n", clock::now_log_timestamp()));
    out.push_str(&utilization_report(sched));
    out.push_str(&screen_ls(sched));
    out.push('\n');
    out.push_str(&memory_snapshot(mem));
    std::fs::write(path, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mem::{AllocKind, FitStrategy, MemoryConfig};
    use crate::process::Pid;
    use crate::sched::Scheduler;

    fn fixture() -> (Scheduler, MemoryManager) {
        let mut cfg = Config::default();
        cfg.num_cpu = 2;
        let log_dir = tempfile::tempdir().unwrap();
        let sched = Scheduler::with_seed_and_log_dir(cfg, 1, log_dir.into_path());
        let dir = tempfile::tempdir().unwrap();
        let mem = MemoryManager::new(MemoryConfig {
            max_overall_mem: 256,
            mem_per_frame: 16,
            min_mem_per_proc: 16,
            max_mem_per_proc: 128,
            kind: AllocKind::Paging,
            strategy: FitStrategy::FirstFit,
            backing_store_path: dir.into_path().join("store.txt"),
        });
        (sched, mem)
    }

    #[test]
    fn screen_ls_renders_empty_sections() {
        let (sched, _) = fixture();
        let text = screen_ls(&sched);
        assert!(text.contains("Running Processes:\n  (None)"));
        assert!(text.contains("Ready Queue (Size: 0)"));
        assert!(text.contains("  (Empty)"));
        assert!(text.contains("Finished Processes (Total: 0)"));
    }

    #[test]
    fn vmstat_shows_paging_sections() {
        let (_, mem) = fixture();
        mem.allocate(Pid(1), "alpha", 40).unwrap();
        let text = vmstat(&mem);
        assert!(text.contains("Total Frames: 16"));
        assert!(text.contains("Used Frames: 3"));
        assert!(text.contains("Internal Fragmentation: 8 KB"));
        assert!(text.contains("alpha"));
    }

    #[test]
    fn memory_map_marks_free_and_owned_frames() {
        let (_, mem) = fixture();
        mem.allocate(Pid(2), "beta", 16).unwrap();
        let text = memory_map(&mem);
        assert!(text.contains("Frame   0: [beta (PID:2)]"));
        assert!(text.contains("Frame   1: [FREE]"));
    }

    #[test]
    fn process_detail_includes_memory_and_progress() {
        let (sched, mem) = fixture();
        sched.spawn_custom("gamma", 32, ["DECLARE x 1"], &mem).unwrap();
        let text = process_detail(&sched, &mem, "gamma").unwrap();
        assert!(text.contains("Process: gamma"));
        assert!(text.contains("Instructions: 0/1"));
        assert!(text.contains("32 KB allocated, 2 pages"));
        assert!(process_detail(&sched, &mem, "missing").is_none());
    }

    #[test]
    fn report_file_combines_all_sections() {
        let (sched, mem) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("csopesy-log.txt");
        write_report(&sched, &mem, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Report generated: "));
        assert!(text.contains("UTILIZATION REPORT"));
        assert!(text.contains("PROCESS STATUS"));
        assert!(text.contains("Memory Statistics:"));
    }
}
