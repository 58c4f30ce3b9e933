//! CART regression tree used by the random forest

use ndarray::{Array1, Array2, ArrayView1};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Arena-allocated tree; node 0 is the root
#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
    /// Total squared-error decrease per feature, unnormalised
    impurity_decrease: Array1<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Sum of child squared errors
    child_sse: f64,
}

impl RegressionTree {
    /// Grow a tree on the given (possibly repeated) sample rows
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, samples: Vec<usize>, params: TreeParams) -> Self {
        let mut builder = Builder {
            x,
            y,
            params,
            nodes: Vec::new(),
            impurity_decrease: Array1::zeros(x.ncols()),
        };
        builder.grow(samples, 0);

        Self {
            nodes: builder.nodes,
            impurity_decrease: builder.impurity_decrease,
        }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn depth_from(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth_from(nodes, *left).max(depth_from(nodes, *right)),
            }
        }
        depth_from(&self.nodes, 0)
    }

    /// Importances normalised to sum 1, or `None` for a single-leaf tree
    pub fn normalized_importances(&self) -> Option<Array1<f64>> {
        let total = self.impurity_decrease.sum();
        if self.nodes.len() <= 1 || total <= 0.0 {
            return None;
        }
        Some(&self.impurity_decrease / total)
    }
}

struct Builder<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    params: TreeParams,
    nodes: Vec<Node>,
    impurity_decrease: Array1<f64>,
}

impl Builder<'_> {
    /// Returns the index of the created node
    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let n = samples.len();
        let mean = samples.iter().map(|&i| self.y[i]).sum::<f64>() / n as f64;
        let sse: f64 = samples.iter().map(|&i| (self.y[i] - mean).powi(2)).sum();

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        let too_small = n < self.params.min_samples_split || n < 2 * self.params.min_samples_leaf;
        let pure = sse <= f64::EPSILON * mean.abs().max(1.0);

        let split = if depth_reached || too_small || pure {
            None
        } else {
            self.best_split(&samples, mean)
        };

        let Some(split) = split else {
            return self.push(Node::Leaf { value: mean });
        };

        self.impurity_decrease[split.feature] += (sse - split.child_sse).max(0.0);

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);

        // Reserve the slot so children come after their parent
        let idx = self.push(Node::Leaf { value: mean });
        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Lowest child squared error over all features and thresholds
    fn best_split(&self, samples: &[usize], mean: f64) -> Option<BestSplit> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;

        for feature in 0..self.x.ncols() {
            // Targets are centred on the node mean to keep the running sums small
            let mut column: Vec<(f64, f64)> = samples
                .iter()
                .map(|&i| (self.x[[i, feature]], self.y[i] - mean))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let total_sum: f64 = column.iter().map(|(_, y)| y).sum();
            let total_sq: f64 = column.iter().map(|(_, y)| y * y).sum();

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for left_n in 1..n {
                let (_, y) = column[left_n - 1];
                left_sum += y;
                left_sq += y * y;

                if left_n < min_leaf || n - left_n < min_leaf {
                    continue;
                }
                let lo = column[left_n - 1].0;
                let hi = column[left_n].0;
                if lo >= hi {
                    continue;
                }

                let right_n = n - left_n;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / left_n as f64;
                let right_sse = right_sq - right_sum * right_sum / right_n as f64;
                let child_sse = left_sse.max(0.0) + right_sse.max(0.0);

                let improves = match &best {
                    Some(b) => child_sse < b.child_sse,
                    None => true,
                };
                if improves {
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        child_sse,
                    });
                }
            }
        }

        best
    }
}
