use std::io::{self, Write};

/// Carriage-return progress line with a fixed description, e.g.
/// "Aggregating cohorts: 3/12 (25%)". Redraws only when the percentage
/// changes so tight loops stay cheap.
pub struct DescriptiveProgress {
    total: usize,
    current: usize,
    description: String,
    last_percentage: usize,
}

impl DescriptiveProgress {
    pub fn new(total: usize, description: &str) -> Self {
        Self {
            total,
            current: 0,
            description: description.to_string(),
            last_percentage: usize::MAX,
        }
    }

    pub fn update(&mut self, current: usize) -> io::Result<()> {
        self.current = current;
        let percentage = self.percentage();
        if percentage != self.last_percentage {
            self.render()?;
            self.last_percentage = percentage;
        }
        Ok(())
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.current = self.total;
        self.render()?;
        println!();
        Ok(())
    }

    fn percentage(&self) -> usize {
        if self.total > 0 {
            (self.current * 100) / self.total
        } else {
            100
        }
    }

    fn render(&self) -> io::Result<()> {
        print!(
            "\r{}: {}/{} ({}%)",
            self.description,
            self.current,
            self.total,
            self.percentage()
        );
        io::stdout().flush()
    }
}

/// Format elapsed time as "[Time used] xx h xx m xx.xxx s".
pub fn format_time_used(elapsed: std::time::Duration) -> String {
    let total_secs = elapsed.as_secs_f64();
    let hours = (total_secs / 3600.0) as u64;
    let minutes = ((total_secs % 3600.0) / 60.0) as u64;
    let seconds = total_secs % 60.0;

    if hours > 0 {
        format!("[Time used] {:02} h {:02} m {:05.3} s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("[Time used] {:02} m {:05.3} s", minutes, seconds)
    } else {
        format!("[Time used] {:05.3} s", seconds)
    }
}
