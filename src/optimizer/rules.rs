//! First-order update rules used by the gradient-descent family.

use serde::{Deserialize, Serialize};

fn default_sgd_lr() -> f64 {
    0.01
}
fn default_adaptive_lr() -> f64 {
    0.001
}
fn default_beta1() -> f64 {
    0.9
}
fn default_beta2() -> f64 {
    0.999
}
fn default_decay() -> f64 {
    0.9
}
fn default_eps() -> f64 {
    1e-7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum UpdateRule {
    Sgd {
        #[serde(default = "default_sgd_lr")]
        lr: f64,
        #[serde(default)]
        momentum: f64,
    },
    Adam {
        #[serde(default = "default_adaptive_lr")]
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
    },
    Rmsprop {
        #[serde(default = "default_adaptive_lr")]
        lr: f64,
        #[serde(default = "default_decay")]
        decay: f64,
        #[serde(default = "default_eps")]
        eps: f64,
    },
    Adagrad {
        #[serde(default = "default_sgd_lr")]
        lr: f64,
        #[serde(default = "default_eps")]
        eps: f64,
    },
}

impl Default for UpdateRule {
    fn default() -> Self {
        UpdateRule::Adam {
            lr: default_adaptive_lr(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
        }
    }
}

impl UpdateRule {
    pub fn adam(lr: f64) -> Self {
        UpdateRule::Adam {
            lr,
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
        }
    }

    pub fn lr(&self) -> f64 {
        match self {
            UpdateRule::Sgd { lr, .. }
            | UpdateRule::Adam { lr, .. }
            | UpdateRule::Rmsprop { lr, .. }
            | UpdateRule::Adagrad { lr, .. } => *lr,
        }
    }

    /// Short name plus learning rate, e.g. `Adam-lr_0.001`.
    pub fn label(&self) -> String {
        let name = match self {
            UpdateRule::Sgd { .. } => "SGD",
            UpdateRule::Adam { .. } => "Adam",
            UpdateRule::Rmsprop { .. } => "RMSProp",
            UpdateRule::Adagrad { .. } => "AdaGrad",
        };
        format!("{}-lr_{}", name, self.lr())
    }

    pub fn validate(&self) -> Result<(), String> {
        let ok = match self {
            UpdateRule::Sgd { lr, momentum } => *lr > 0.0 && (0.0..1.0).contains(momentum),
            UpdateRule::Adam { lr, beta1, beta2, eps } => {
                *lr > 0.0
                    && (0.0..1.0).contains(beta1)
                    && (0.0..1.0).contains(beta2)
                    && *eps > 0.0
            }
            UpdateRule::Rmsprop { lr, decay, eps } => {
                *lr > 0.0 && (0.0..1.0).contains(decay) && *eps > 0.0
            }
            UpdateRule::Adagrad { lr, eps } => *lr > 0.0 && *eps > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("invalid update rule hyper-parameters: {:?}", self))
        }
    }

    pub fn stepper(&self) -> Stepper {
        Stepper {
            rule: self.clone(),
            first: Vec::new(),
            second: Vec::new(),
            t: 0,
        }
    }
}

/// An update rule together with its moment estimates.
#[derive(Debug, Clone)]
pub struct Stepper {
    rule: UpdateRule,
    first: Vec<f64>,
    second: Vec<f64>,
    t: u64,
}

impl Stepper {
    /// Forget accumulated moments; the next step behaves like the first.
    pub fn reset(&mut self) {
        self.first.clear();
        self.second.clear();
        self.t = 0;
    }

    pub fn step(&mut self, params: &[f64], grad: &[f64]) -> Vec<f64> {
        let n = params.len();
        if self.first.len() != n {
            self.first = vec![0.0; n];
            self.second = vec![0.0; n];
        }
        self.t += 1;

        match self.rule {
            UpdateRule::Sgd { lr, momentum } => (0..n)
                .map(|i| {
                    let update = momentum * self.first[i] + lr * grad[i];
                    self.first[i] = update;
                    params[i] - update
                })
                .collect(),
            UpdateRule::Adam { lr, beta1, beta2, eps } => {
                let bias1 = 1.0 - beta1.powf(self.t as f64);
                let bias2 = 1.0 - beta2.powf(self.t as f64);
                (0..n)
                    .map(|i| {
                        self.first[i] = beta1 * self.first[i] + (1.0 - beta1) * grad[i];
                        self.second[i] = beta2 * self.second[i] + (1.0 - beta2) * grad[i] * grad[i];
                        let m_hat = self.first[i] / bias1;
                        let v_hat = self.second[i] / bias2;
                        params[i] - lr * m_hat / (v_hat.sqrt() + eps)
                    })
                    .collect()
            }
            UpdateRule::Rmsprop { lr, decay, eps } => (0..n)
                .map(|i| {
                    self.second[i] = decay * self.second[i] + (1.0 - decay) * grad[i] * grad[i];
                    params[i] - lr * grad[i] / (self.second[i].sqrt() + eps)
                })
                .collect(),
            UpdateRule::Adagrad { lr, eps } => (0..n)
                .map(|i| {
                    self.second[i] += grad[i] * grad[i];
                    params[i] - lr * grad[i] / (self.second[i].sqrt() + eps)
                })
                .collect(),
        }
    }
}
