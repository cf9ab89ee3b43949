//! HTML Report Generation with Chart.js

use crate::analytics::metrics::{HistogramBucket, MetricsCalculator, PriceDataPoint};
use crate::simulation::orchestrator::{RunResult, SimulationResults};
use crate::utils::fixed_point::contract_18_decimals_to_f64;
use anyhow::{Context, Result};
use minijinja::{context, Environment};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use tracing::info;

/// Per-run numbers shown on the stat cards
#[derive(Debug, Serialize)]
struct RunCard {
    scenario: String,
    transactions: u64,
    success: u64,
    blocked: u64,
    blocked_rate: String,
    not_enough_reserves: u64,
    exceeded_max_slippage: u64,
    k_error: u64,
    clipped: u64,
    system_fee: String,
    final_price: String,
    fingerprint: String,
}

impl RunCard {
    fn from_run(run: &RunResult) -> Self {
        let s = &run.summary;
        Self {
            scenario: run.scenario.clone(),
            transactions: s.total_transactions,
            success: s.success,
            blocked: s.blocked_by_mitigation,
            blocked_rate: format!("{:.2}", s.blocked_rate),
            not_enough_reserves: s.not_enough_reserves,
            exceeded_max_slippage: s.exceeded_max_slippage,
            k_error: s.k_error,
            clipped: s.clipped,
            system_fee: format!("{:.4}", contract_18_decimals_to_f64(s.total_system_fee)),
            final_price: format!("{:.6}", s.final_price),
            fingerprint: run.fingerprint.clone(),
        }
    }

    fn status_counts(&self) -> [u64; 6] {
        [
            self.success,
            self.blocked,
            self.not_enough_reserves,
            self.exceeded_max_slippage,
            self.k_error,
            self.clipped,
        ]
    }
}

/// Generate an HTML report with interactive charts
pub fn generate_report(results: &SimulationResults, output_path: &str) -> Result<String> {
    // Ensure output directory exists
    if let Some(parent) = std::path::Path::new(output_path).parent() {
        fs::create_dir_all(parent)?;
    }

    let html = render_html(results)?;

    let mut file = File::create(output_path)
        .context("Failed to create report file")?;
    file.write_all(html.as_bytes())
        .context("Failed to write report file")?;

    info!("Report generated: {}", output_path);
    Ok(output_path.to_string())
}

fn price_series(points: &[PriceDataPoint]) -> Vec<f64> {
    points.iter().map(|p| p.price).collect()
}

/// Chart data is inlined into `<script>` as JSON
fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize chart data")
}

fn render_html(results: &SimulationResults) -> Result<String> {
    let cards: Vec<RunCard> = results.runs.iter().map(RunCard::from_run).collect();

    // Price trajectories share the transaction axis
    let prices: Vec<Vec<PriceDataPoint>> = results.runs.iter().map(MetricsCalculator::price_over_time).collect();
    let labels: Vec<u64> = prices
        .iter()
        .max_by_key(|p| p.len())
        .map(|p| p.iter().map(|point| point.transaction).collect())
        .unwrap_or_default();
    let price_datasets: Vec<(String, Vec<f64>)> = results
        .runs
        .iter()
        .zip(&prices)
        .map(|(run, points)| (run.scenario.clone(), price_series(points)))
        .collect();

    let reserve_run = results.run(true).or_else(|| results.runs.first());
    let (reserve_x, reserve_y): (Vec<f64>, Vec<f64>) = reserve_run
        .map(|run| run.pool_history.iter().map(|p| (p.reserve_x, p.reserve_y)).unzip())
        .unwrap_or_default();

    let histogram: Vec<HistogramBucket> = reserve_run
        .map(MetricsCalculator::out_amount_diff_distribution)
        .unwrap_or_default();
    let hist_labels: Vec<&str> = histogram.iter().map(|b| b.label.as_str()).collect();
    let hist_values: Vec<u32> = histogram.iter().map(|b| b.count).collect();

    let status_datasets: Vec<(String, [u64; 6])> = cards
        .iter()
        .map(|card| (card.scenario.clone(), card.status_counts()))
        .collect();

    let comparison = results.comparison.as_ref().map(|c| {
        context! {
            blocked_swaps => c.blocked_swaps,
            blocked_rate => format!("{:.2}", c.blocked_rate),
            system_fee_off => format!("{:.4}", c.system_fee_off),
            system_fee_on => format!("{:.4}", c.system_fee_on),
            final_price_off => format!("{:.6}", c.final_price_off),
            final_price_on => format!("{:.6}", c.final_price_on),
            reserve_x_divergence => format!("{:.4}", c.reserve_x_divergence_percent),
            reserve_y_divergence => format!("{:.4}", c.reserve_y_divergence_percent),
        }
    });

    let config = &results.config;
    let labels_json = to_json(&labels)?;
    let price_json = to_json(&price_datasets)?;
    let reserve_x_json = to_json(&reserve_x)?;
    let reserve_y_json = to_json(&reserve_y)?;
    let hist_labels_json = to_json(&hist_labels)?;
    let hist_values_json = to_json(&hist_values)?;
    let status_json = to_json(&status_datasets)?;

    let mut env = Environment::new();
    env.add_template("report.html", REPORT_TEMPLATE)
        .context("Failed to parse report template")?;
    let template = env.get_template("report.html")
        .context("Failed to load report template")?;

    template
        .render(context! {
            timestamp => results.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            token_x => &config.token_x,
            token_y => &config.token_y,
            initial_reserve_x => format!("{:.2}", contract_18_decimals_to_f64(config.initial_reserve_x)),
            initial_reserve_y => format!("{:.2}", contract_18_decimals_to_f64(config.initial_reserve_y)),
            window_size => config.window_size,
            granularity => config.granularity,
            threshold => config.price_tolerance_threshold,
            avg_block_time => config.avg_block_time,
            seed => config.seed,
            runs => cards,
            comparison => comparison,
            labels_json => labels_json,
            price_json => price_json,
            reserve_x_json => reserve_x_json,
            reserve_y_json => reserve_y_json,
            hist_labels_json => hist_labels_json,
            hist_values_json => hist_values_json,
            status_json => status_json,
        })
        .context("Failed to render report")
}

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Volatility Mitigation Simulation Report</title>
    <script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
    <link href="https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700;800&display=swap" rel="stylesheet">
    <style>
        :root {
            --bg-primary: #0a0a0a;
            --bg-card: #1c1c1c;
            --text-primary: #ffffff;
            --text-secondary: #888888;
            --accent-cyan: #22d3ee;
            --accent-green: #10b981;
            --accent-red: #ef4444;
            --accent-orange: #f59e0b;
        }
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: 'Inter', -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
        }
        .container { max-width: 1200px; margin: 0 auto; padding: 2rem; }
        header {
            text-align: center;
            padding: 4rem 2rem;
            background: linear-gradient(180deg, rgba(139, 92, 246, 0.15) 0%, transparent 100%);
            border-bottom: 1px solid rgba(255, 255, 255, 0.08);
            margin-bottom: 3rem;
        }
        header h1 {
            font-size: 3rem;
            font-weight: 800;
            background: linear-gradient(135deg, #a78bfa, #22d3ee);
            -webkit-background-clip: text;
            -webkit-text-fill-color: transparent;
        }
        header .subtitle { font-size: 1.25rem; color: var(--text-secondary); }
        header .timestamp { font-size: 0.875rem; color: rgba(255,255,255,0.4); }
        .stats-grid {
            display: grid;
            grid-template-columns: repeat(3, 1fr);
            gap: 1.25rem;
            margin-bottom: 3rem;
        }
        @media (max-width: 900px) { .stats-grid { grid-template-columns: 1fr; } }
        .stat-card {
            background: var(--bg-card);
            border-radius: 1rem;
            padding: 1.75rem;
            border: 1px solid rgba(255, 255, 255, 0.06);
        }
        .stat-card h3 {
            font-size: 0.75rem;
            text-transform: uppercase;
            letter-spacing: 0.1em;
            color: var(--text-secondary);
            margin-bottom: 0.75rem;
        }
        .stat-card .value { font-size: 2.25rem; font-weight: 700; }
        .stat-card .label { font-size: 0.875rem; color: var(--text-secondary); }
        .stat-card.highlight { border-color: rgba(16, 185, 129, 0.25); }
        .stat-card.danger { border-color: rgba(239, 68, 68, 0.25); }
        .chart-card {
            background: var(--bg-card);
            border-radius: 1.25rem;
            padding: 2rem;
            border: 1px solid rgba(255, 255, 255, 0.06);
            margin-bottom: 2rem;
        }
        .chart-card h3 { font-size: 1.25rem; font-weight: 600; margin-bottom: 1.5rem; }
        .chart-container { position: relative; height: 400px; width: 100%; }
        table { width: 100%; border-collapse: collapse; }
        td, th { padding: 0.5rem; text-align: right; border-bottom: 1px solid rgba(255,255,255,0.06); }
        th:first-child, td:first-child { text-align: left; }
        code { color: var(--text-secondary); font-size: 0.75rem; }
        footer {
            text-align: center;
            padding: 3rem 2rem;
            color: var(--text-secondary);
            border-top: 1px solid rgba(255, 255, 255, 0.06);
        }
    </style>
</head>
<body>
    <header>
        <h1>Volatility Mitigation Report</h1>
        <p class="subtitle">{{ token_x }}/{{ token_y }} pool, {{ initial_reserve_x }} / {{ initial_reserve_y }} initial reserves</p>
        <p class="subtitle">TWAP window {{ window_size }}s in {{ granularity }} observations, tolerance {{ threshold }}, {{ avg_block_time }}s blocks, seed {{ seed }}</p>
        <p class="timestamp">Generated: {{ timestamp }}</p>
    </header>

    <div class="container">
        {% if comparison %}
        <div class="stats-grid">
            <div class="stat-card danger">
                <h3>Swaps Blocked</h3>
                <div class="value" style="color: var(--accent-red);">{{ comparison.blocked_swaps }}</div>
                <div class="label">{{ comparison.blocked_rate }}% of swaps</div>
            </div>
            <div class="stat-card">
                <h3>System Fee ({{ token_y }})</h3>
                <div class="value">{{ comparison.system_fee_on }}</div>
                <div class="label">{{ comparison.system_fee_off }} without mitigation</div>
            </div>
            <div class="stat-card highlight">
                <h3>Final Price {{ token_x }} in {{ token_y }}</h3>
                <div class="value" style="color: var(--accent-green);">{{ comparison.final_price_on }}</div>
                <div class="label">{{ comparison.final_price_off }} without mitigation</div>
            </div>
        </div>
        {% endif %}

        <div class="chart-card">
            <h3>Outcomes per Run</h3>
            <table>
                <tr>
                    <th>Scenario</th><th>Transactions</th><th>Success</th><th>Blocked</th>
                    <th>Not enough reserves</th><th>Slippage</th><th>K error</th><th>Clipped</th>
                    <th>System fee</th><th>Final price</th>
                </tr>
                {% for run in runs %}
                <tr>
                    <td>{{ run.scenario }}<br><code>{{ run.fingerprint }}</code></td>
                    <td>{{ run.transactions }}</td>
                    <td>{{ run.success }}</td>
                    <td>{{ run.blocked }} ({{ run.blocked_rate }}%)</td>
                    <td>{{ run.not_enough_reserves }}</td>
                    <td>{{ run.exceeded_max_slippage }}</td>
                    <td>{{ run.k_error }}</td>
                    <td>{{ run.clipped }}</td>
                    <td>{{ run.system_fee }}</td>
                    <td>{{ run.final_price }}</td>
                </tr>
                {% endfor %}
            </table>
        </div>

        <div class="chart-card">
            <h3>Price of {{ token_x }} in {{ token_y }}</h3>
            <div class="chart-container"><canvas id="priceChart"></canvas></div>
        </div>

        <div class="chart-card">
            <h3>Reserves</h3>
            <div class="chart-container"><canvas id="reserveChart"></canvas></div>
        </div>

        <div class="chart-card">
            <h3>Transaction Status</h3>
            <div class="chart-container"><canvas id="statusChart"></canvas></div>
        </div>

        <div class="chart-card">
            <h3>Pool vs Oracle Output Deviation</h3>
            <div class="chart-container"><canvas id="histChart"></canvas></div>
        </div>
    </div>

    <footer>
        <p>Built with Rust + Chart.js</p>
    </footer>

    <script>
        Chart.defaults.color = '#888888';
        Chart.defaults.borderColor = 'rgba(255, 255, 255, 0.08)';
        Chart.defaults.font.family = 'Inter, -apple-system, BlinkMacSystemFont, sans-serif';

        const colors = ['#ef4444', '#10b981', '#22d3ee', '#f59e0b'];
        const lineOptions = {
            responsive: true,
            maintainAspectRatio: false,
            interaction: { intersect: false, mode: 'index' },
            scales: { x: { ticks: { maxTicksLimit: 20 } } }
        };

        const labels = {{ labels_json|safe }};
        const prices = {{ price_json|safe }};
        new Chart(document.getElementById('priceChart'), {
            type: 'line',
            data: {
                labels: labels,
                datasets: prices.map(([name, data], i) => ({
                    label: name,
                    data: data,
                    borderColor: colors[i % colors.length],
                    borderWidth: 2,
                    pointRadius: 0,
                    tension: 0.2
                }))
            },
            options: lineOptions
        });

        new Chart(document.getElementById('reserveChart'), {
            type: 'line',
            data: {
                labels: labels,
                datasets: [
                    { label: '{{ token_x }}', data: {{ reserve_x_json|safe }}, borderColor: colors[2], pointRadius: 0 },
                    { label: '{{ token_y }}', data: {{ reserve_y_json|safe }}, borderColor: colors[3], pointRadius: 0 }
                ]
            },
            options: lineOptions
        });

        const statuses = {{ status_json|safe }};
        new Chart(document.getElementById('statusChart'), {
            type: 'bar',
            data: {
                labels: ['Success', 'Blocked', 'Not enough reserves', 'Slippage', 'K error', 'Clipped'],
                datasets: statuses.map(([name, data], i) => ({
                    label: name,
                    data: data,
                    backgroundColor: colors[i % colors.length],
                    borderRadius: 6
                }))
            },
            options: { responsive: true, maintainAspectRatio: false }
        });

        new Chart(document.getElementById('histChart'), {
            type: 'bar',
            data: {
                labels: {{ hist_labels_json|safe }},
                datasets: [{
                    label: 'Checked swaps',
                    data: {{ hist_values_json|safe }},
                    backgroundColor: 'rgba(139, 92, 246, 0.7)',
                    borderRadius: 6
                }]
            },
            options: {
                responsive: true,
                maintainAspectRatio: false,
                plugins: { legend: { display: false } }
            }
        });
    </script>
</body>
</html>
"#;
