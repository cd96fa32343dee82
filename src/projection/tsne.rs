//! t-SNE — t-Distributed Stochastic Neighbor Embedding
//!
//! 厳密版（全ペア計算）の実装です。サンプル数千件程度までを想定しています。
//! - 各点の条件付き確率は perplexity に一致するよう精度（beta）を二分探索
//! - 低次元側は自由度 α = max(n_components - 1, 1) のStudent-t分布
//! - 勾配降下はモメンタム + ゲイン適応、前半は early exaggeration

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const MACHINE_EPSILON: f64 = f64::EPSILON;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const MIN_GAIN: f64 = 0.01;
const CHECK_INTERVAL: usize = 50;

/// t-SNE設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TsneConfig {
    /// 出力次元数
    pub n_components: usize,
    /// 実効的な近傍数
    pub perplexity: f64,
    /// 初期段階でPを何倍に強調するか
    pub early_exaggeration: f64,
    /// 学習率（Noneの場合は max(n / early_exaggeration / 4, 50)）
    pub learning_rate: Option<f64>,
    /// 最大反復回数（early exaggeration段階を含む）
    pub n_iter: usize,
    /// early exaggeration段階の反復回数
    pub exaggeration_iter: usize,
    /// 改善が見られない場合に打ち切るまでの反復回数
    pub n_iter_without_progress: usize,
    /// 勾配ノルムがこれを下回ったら終了
    pub min_grad_norm: f64,
    /// 乱数シード
    pub random_state: u64,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            perplexity: 30.0,
            early_exaggeration: 12.0,
            learning_rate: None,
            n_iter: 1000,
            exaggeration_iter: 250,
            n_iter_without_progress: 300,
            min_grad_norm: 1e-7,
            random_state: 42,
        }
    }
}

/// 埋め込み結果
#[derive(Debug, Clone)]
pub struct TsneResult {
    /// n_samples 行 x n_components 列
    pub embedding: Vec<Vec<f64>>,
    /// 最終的なKLダイバージェンス
    pub kl_divergence: f64,
    /// 実行した反復回数
    pub n_iter: usize,
}

pub struct Tsne {
    config: TsneConfig,
}

impl Tsne {
    pub fn new(config: TsneConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TsneConfig {
        &self.config
    }

    fn validate(&self, data: &[Vec<f32>]) -> Result<usize> {
        let n = data.len();
        if n < 2 {
            anyhow::bail!("t-SNE requires at least 2 samples, got {}", n);
        }
        if self.config.n_components == 0 {
            anyhow::bail!("n_components must be positive");
        }
        let dim = data[0].len();
        if dim == 0 {
            anyhow::bail!("Feature vectors must not be empty");
        }
        if let Some((i, row)) = data.iter().enumerate().find(|(_, row)| row.len() != dim) {
            anyhow::bail!(
                "Inconsistent feature length at sample {}: expected {}, got {}",
                i,
                dim,
                row.len()
            );
        }
        let perplexity = self.config.perplexity;
        if !(perplexity > 0.0 && perplexity < n as f64) {
            anyhow::bail!(
                "perplexity must be in (0, n_samples): perplexity={}, n_samples={}",
                perplexity,
                n
            );
        }
        Ok(n)
    }

    /// 学習率（auto指定を解決済み）
    pub fn learning_rate(&self, n_samples: usize) -> f64 {
        self.config
            .learning_rate
            .unwrap_or_else(|| (n_samples as f64 / self.config.early_exaggeration / 4.0).max(50.0))
    }

    /// 高次元データを n_components 次元に埋め込む
    pub fn fit_transform(&self, data: &[Vec<f32>]) -> Result<TsneResult> {
        let n = self.validate(data)?;
        let dims = self.config.n_components;

        let distances = pairwise_squared_distances(data);
        let conditional = conditional_probabilities(&distances, n, self.config.perplexity);
        let mut p = joint_probabilities(&conditional, n);

        let mut y = random_init(n, dims, self.config.random_state);
        let learning_rate = self.learning_rate(n);
        log::debug!("t-SNE: n={}, learning_rate={:.2}", n, learning_rate);

        let mut optimizer = GradientDescent::new(n * dims, learning_rate);
        let alpha = (dims as f64 - 1.0).max(1.0);

        // 第1段階: early exaggeration
        let exaggeration = self.config.early_exaggeration;
        p.iter_mut().for_each(|v| *v *= exaggeration);
        let stage1_end = self.config.exaggeration_iter.min(self.config.n_iter);
        let mut iter = optimizer.run(&mut y, &p, n, dims, alpha, 0, stage1_end, 0.5, &self.config);

        // 第2段階: 通常のP
        p.iter_mut().for_each(|v| *v /= exaggeration);
        optimizer.reset_progress();
        iter = optimizer.run(&mut y, &p, n, dims, alpha, iter, self.config.n_iter, 0.8, &self.config);

        let (kl_divergence, _) = kl_divergence_and_gradient(&y, &p, n, dims, alpha, false);
        log::info!("t-SNE 完了: {} 回反復, KLダイバージェンス {:.4}", iter, kl_divergence);

        Ok(TsneResult {
            embedding: y.chunks(dims).map(|c| c.to_vec()).collect(),
            kl_divergence,
            n_iter: iter,
        })
    }
}

/// 全ペアの二乗ユークリッド距離（n x n、行優先）
fn pairwise_squared_distances(data: &[Vec<f32>]) -> Vec<f64> {
    let n = data.len();
    let mut distances = vec![0.0f64; n * n];
    distances
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, d) in row.iter_mut().enumerate() {
                if i != j {
                    *d = data[i]
                        .iter()
                        .zip(&data[j])
                        .map(|(a, b)| {
                            let diff = (*a - *b) as f64;
                            diff * diff
                        })
                        .sum();
                }
            }
        });
    distances
}

/// 各点の条件付き確率 p(j|i)（行ごとに和が1）
///
/// エントロピーが ln(perplexity) になるよう beta を二分探索する。
pub(crate) fn conditional_probabilities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let desired_entropy = perplexity.ln();
    let mut probabilities = vec![0.0f64; n * n];

    probabilities
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            let dist = &distances[i * n..(i + 1) * n];
            // 数値安定化のため最小距離を引く（エントロピーは不変）
            let min_dist = dist
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, d)| *d)
                .fold(f64::INFINITY, f64::min);

            let mut beta = 1.0f64;
            let mut beta_min = f64::NEG_INFINITY;
            let mut beta_max = f64::INFINITY;

            for _ in 0..PERPLEXITY_STEPS {
                let mut sum_p = 0.0;
                for (j, p) in row.iter_mut().enumerate() {
                    *p = if j == i { 0.0 } else { (-(dist[j] - min_dist) * beta).exp() };
                    sum_p += *p;
                }
                if sum_p == 0.0 {
                    sum_p = 1e-8;
                }

                let mut sum_dist_p = 0.0;
                for (j, p) in row.iter_mut().enumerate() {
                    *p /= sum_p;
                    sum_dist_p += (dist[j] - min_dist).max(0.0) * *p;
                }

                let entropy = sum_p.ln() + beta * sum_dist_p;
                let diff = entropy - desired_entropy;
                if diff.abs() <= PERPLEXITY_TOLERANCE {
                    break;
                }

                if diff > 0.0 {
                    beta_min = beta;
                    beta = if beta_max == f64::INFINITY { beta * 2.0 } else { (beta + beta_max) / 2.0 };
                } else {
                    beta_max = beta;
                    beta = if beta_min == f64::NEG_INFINITY { beta / 2.0 } else { (beta + beta_min) / 2.0 };
                }
            }
        });

    probabilities
}

/// 対称化した同時確率 P（全体の和が1）
fn joint_probabilities(conditional: &[f64], n: usize) -> Vec<f64> {
    let mut p = vec![0.0f64; n * n];
    for i in 0..n {
        for j in 0..n {
            p[i * n + j] = conditional[i * n + j] + conditional[j * n + i];
        }
    }
    let sum: f64 = p.iter().sum::<f64>().max(MACHINE_EPSILON);
    for (idx, v) in p.iter_mut().enumerate() {
        *v = if idx / n == idx % n { 0.0 } else { (*v / sum).max(MACHINE_EPSILON) };
    }
    p
}

/// 標準正規分布 x 1e-4 での初期配置（Box-Muller）
fn random_init(n: usize, dims: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dims)
        .map(|_| {
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen::<f64>();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            1e-4 * z
        })
        .collect()
}

/// KLダイバージェンスと勾配
///
/// q_ij ∝ (1 + |y_i - y_j|² / α)^(-(α+1)/2)
/// ∂C/∂y_i = (2(α+1)/α) Σ_j (p_ij - q_ij) (1 + |y_i - y_j|² / α)^(-1) (y_i - y_j)
fn kl_divergence_and_gradient(
    y: &[f64],
    p: &[f64],
    n: usize,
    dims: usize,
    alpha: f64,
    compute_gradient: bool,
) -> (f64, Vec<f64>) {
    let exponent = (alpha + 1.0) / -2.0;

    // t_ij = (1 + d²/α)^-1 と非正規化 q_ij
    let mut t = vec![0.0f64; n * n];
    t.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let yi = &y[i * dims..(i + 1) * dims];
        for (j, v) in row.iter_mut().enumerate() {
            if i == j {
                continue;
            }
            let yj = &y[j * dims..(j + 1) * dims];
            let d2: f64 = yi.iter().zip(yj).map(|(a, b)| (a - b) * (a - b)).sum();
            *v = 1.0 / (1.0 + d2 / alpha);
        }
    });

    let q_unnormalized = |v: f64| if alpha == 1.0 { v } else { v.powf(-exponent) };
    // 行ごとの部分和を順に合計する（並列実行でも結果は決定的）
    let z = t
        .par_chunks(n)
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, v)| q_unnormalized(*v))
                .sum::<f64>()
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum::<f64>()
        .max(MACHINE_EPSILON);

    let kl: f64 = t
        .par_chunks(n)
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, v)| {
                    let idx = i * n + j;
                    let q = (q_unnormalized(*v) / z).max(MACHINE_EPSILON);
                    let pij = p[idx].max(MACHINE_EPSILON);
                    p[idx] * (pij / q).ln()
                })
                .sum::<f64>()
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum();

    if !compute_gradient {
        return (kl, Vec::new());
    }

    let c = 2.0 * (alpha + 1.0) / alpha;
    let mut grad = vec![0.0f64; n * dims];
    grad.par_chunks_mut(dims).enumerate().for_each(|(i, g)| {
        let yi = &y[i * dims..(i + 1) * dims];
        for j in 0..n {
            if i == j {
                continue;
            }
            let idx = i * n + j;
            let q = (q_unnormalized(t[idx]) / z).max(MACHINE_EPSILON);
            let coeff = (p[idx] - q) * t[idx];
            let yj = &y[j * dims..(j + 1) * dims];
            for d in 0..dims {
                g[d] += coeff * (yi[d] - yj[d]);
            }
        }
        for v in g.iter_mut() {
            *v *= c;
        }
    });

    (kl, grad)
}

/// モメンタム + ゲイン適応付き勾配降下
struct GradientDescent {
    update: Vec<f64>,
    gains: Vec<f64>,
    learning_rate: f64,
    best_error: f64,
    best_iter: usize,
}

impl GradientDescent {
    fn new(size: usize, learning_rate: f64) -> Self {
        Self {
            update: vec![0.0; size],
            gains: vec![1.0; size],
            learning_rate,
            best_error: f64::INFINITY,
            best_iter: 0,
        }
    }

    fn reset_progress(&mut self) {
        self.best_error = f64::INFINITY;
    }

    /// [start, end) の反復を実行し、終了時点の反復数を返す
    #[allow(clippy::too_many_arguments)]
    fn run(
        &mut self,
        y: &mut [f64],
        p: &[f64],
        n: usize,
        dims: usize,
        alpha: f64,
        start: usize,
        end: usize,
        momentum: f64,
        config: &TsneConfig,
    ) -> usize {
        self.best_iter = start;
        for iter in start..end {
            let (error, mut grad) = kl_divergence_and_gradient(y, p, n, dims, alpha, true);

            for k in 0..grad.len() {
                if self.update[k] * grad[k] < 0.0 {
                    self.gains[k] += 0.2;
                } else {
                    self.gains[k] *= 0.8;
                }
                self.gains[k] = self.gains[k].max(MIN_GAIN);
                grad[k] *= self.gains[k];
                self.update[k] = momentum * self.update[k] - self.learning_rate * grad[k];
                y[k] += self.update[k];
            }

            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();

            if (iter + 1) % CHECK_INTERVAL == 0 {
                log::debug!(
                    "t-SNE iter {}: error = {:.6}, gradient norm = {:.8}",
                    iter + 1,
                    error,
                    grad_norm
                );
                if error < self.best_error {
                    self.best_error = error;
                    self.best_iter = iter;
                } else if iter - self.best_iter > config.n_iter_without_progress {
                    log::debug!("t-SNE: {} 回改善が無いため終了", config.n_iter_without_progress);
                    return iter + 1;
                }
            }

            if grad_norm < config.min_grad_norm {
                log::debug!("t-SNE: 勾配ノルム {:.2e} で収束", grad_norm);
                return iter + 1;
            }
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters(per_cluster: usize) -> Vec<Vec<f32>> {
        let mut data = Vec::new();
        for i in 0..per_cluster {
            let f = i as f32 * 0.01;
            data.push(vec![f, f * 0.5, 0.0, 0.1, f]);
        }
        for i in 0..per_cluster {
            let f = i as f32 * 0.01;
            data.push(vec![5.0 + f, 5.0, 5.0 - f, 5.0, 5.0]);
        }
        data
    }

    fn small_config() -> TsneConfig {
        TsneConfig {
            perplexity: 5.0,
            n_iter: 400,
            exaggeration_iter: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = TsneConfig::default();
        assert_eq!(config.n_components, 3);
        assert_eq!(config.perplexity, 30.0);
        assert_eq!(config.random_state, 42);
        assert!(config.learning_rate.is_none());
    }

    #[test]
    fn test_auto_learning_rate() {
        let tsne = Tsne::new(TsneConfig::default());
        assert_eq!(tsne.learning_rate(100), 50.0);
        assert!((tsne.learning_rate(12_000) - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_conditional_perplexity() {
        let data = two_clusters(15);
        let n = data.len();
        let distances = pairwise_squared_distances(&data);
        let p = conditional_probabilities(&distances, n, 5.0);

        for i in 0..n {
            let row = &p[i * n..(i + 1) * n];
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert_eq!(row[i], 0.0);
            let entropy: f64 = -row.iter().filter(|v| **v > 0.0).map(|v| v * v.ln()).sum::<f64>();
            assert!((entropy.exp() - 5.0).abs() < 0.05, "row {} perplexity {}", i, entropy.exp());
        }
    }

    #[test]
    fn test_joint_symmetric() {
        let data = two_clusters(5);
        let n = data.len();
        let distances = pairwise_squared_distances(&data);
        let p = joint_probabilities(&conditional_probabilities(&distances, n, 3.0), n);

        let sum: f64 = p.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for i in 0..n {
            for j in 0..n {
                assert!((p[i * n + j] - p[j * n + i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let data = two_clusters(4);
        let n = data.len();
        let dims = 3;
        let distances = pairwise_squared_distances(&data);
        let p = joint_probabilities(&conditional_probabilities(&distances, n, 3.0), n);
        let y: Vec<f64> = (0..n * dims).map(|k| ((k * 37 % 11) as f64 - 5.0) * 0.3).collect();
        let alpha = 2.0;

        let (_, grad) = kl_divergence_and_gradient(&y, &p, n, dims, alpha, true);
        let h = 1e-6;
        for k in [0, 5, 13] {
            let mut plus = y.clone();
            plus[k] += h;
            let mut minus = y.clone();
            minus[k] -= h;
            let (kl_plus, _) = kl_divergence_and_gradient(&plus, &p, n, dims, alpha, false);
            let (kl_minus, _) = kl_divergence_and_gradient(&minus, &p, n, dims, alpha, false);
            let numeric = (kl_plus - kl_minus) / (2.0 * h);
            assert!(
                (numeric - grad[k]).abs() < 1e-4,
                "k={} numeric={} analytic={}",
                k,
                numeric,
                grad[k]
            );
        }
    }

    #[test]
    fn test_embedding_shape_and_determinism() {
        let data = two_clusters(10);
        let tsne = Tsne::new(small_config());

        let a = tsne.fit_transform(&data).unwrap();
        let b = tsne.fit_transform(&data).unwrap();

        assert_eq!(a.embedding.len(), 20);
        for row in &a.embedding {
            assert_eq!(row.len(), 3);
            assert!(row.iter().all(|v| v.is_finite()));
        }
        assert_eq!(a.embedding, b.embedding);
        assert!(a.kl_divergence.is_finite());
    }

    #[test]
    fn test_cluster_separation() {
        let data = two_clusters(15);
        let result = Tsne::new(small_config()).fit_transform(&data).unwrap();

        let centroid = |rows: &[Vec<f64>]| -> Vec<f64> {
            (0..3)
                .map(|d| rows.iter().map(|r| r[d]).sum::<f64>() / rows.len() as f64)
                .collect()
        };
        let spread = |rows: &[Vec<f64>], c: &[f64]| -> f64 {
            rows.iter()
                .map(|r| r.iter().zip(c).map(|(a, b)| (a - b).powi(2)).sum::<f64>().sqrt())
                .sum::<f64>()
                / rows.len() as f64
        };

        let (a, b) = result.embedding.split_at(15);
        let (ca, cb) = (centroid(a), centroid(b));
        let between = ca.iter().zip(&cb).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt();
        let within = spread(a, &ca).max(spread(b, &cb));
        assert!(between > within, "between={} within={}", between, within);
    }

    #[test]
    fn test_invalid_inputs() {
        let tsne = Tsne::new(TsneConfig::default());
        assert!(tsne.fit_transform(&[vec![1.0, 2.0]]).is_err());

        // perplexity >= n
        assert!(tsne.fit_transform(&two_clusters(5)).is_err());

        let ragged = vec![vec![1.0, 2.0], vec![1.0], vec![0.0, 0.0]];
        let tsne = Tsne::new(TsneConfig {
            perplexity: 1.5,
            ..Default::default()
        });
        assert!(tsne.fit_transform(&ragged).is_err());

        let tsne = Tsne::new(TsneConfig {
            n_components: 0,
            perplexity: 2.0,
            ..Default::default()
        });
        assert!(tsne.fit_transform(&two_clusters(3)).is_err());
    }
}
