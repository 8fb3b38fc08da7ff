use std::io::Write;

/// 定宽直方图，同时维护均值/方差所需的累计量。
/// 超出 [min, max) 的数据点计入 below / above。
#[derive(Debug, Clone)]
pub struct Distribution {
    min: f64,
    bin_size: f64,
    bins: Vec<u64>,
    below: u64,
    above: u64,
    count: u64,
    sum: f64,
    sum_sq: f64,
}

impl Distribution {
    pub fn new(min: f64, max: f64, bin_size: f64) -> Self {
        let n = if bin_size > 0.0 && max > min { ((max - min) / bin_size).ceil() as usize } else { 0 };
        Self { min, bin_size, bins: vec![0; n], below: 0, above: 0, count: 0, sum: 0.0, sum_sq: 0.0 }
    }

    pub fn process(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        if value < self.min {
            self.below += 1;
            return;
        }
        let bin = ((value - self.min) / self.bin_size) as usize;
        match self.bins.get_mut(bin) {
            Some(c) => *c += 1,
            None => self.above += 1,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { return 0.0; }
        self.sum / self.count as f64
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 { return 0.0; }
        let m = self.mean();
        (self.sum_sq / self.count as f64 - m * m).max(0.0)
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    /// 按整数格式输出：每行 `下界\t计数`，末尾给出越界计数与均值。
    pub fn write_int<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        if self.below > 0 {
            writeln!(out, "<{}\t{}", self.min as i64, self.below)?;
        }
        for (i, &c) in self.bins.iter().enumerate() {
            let lower = self.min + i as f64 * self.bin_size;
            writeln!(out, "{}\t{}", lower as i64, c)?;
        }
        if self.above > 0 {
            let upper = self.min + self.bins.len() as f64 * self.bin_size;
            writeln!(out, ">={}\t{}", upper as i64, self.above)?;
        }
        writeln!(out, "Total\t{}\tMean\t{:.3}\tSD\t{:.3}", self.count, self.mean(), self.variance().sqrt())
    }
}

/// 总体均值与标准差；空输入返回 (0, 0)。
pub fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_bins_and_moments() {
        let mut d = Distribution::new(0.0, 4.0, 1.0);
        for v in [0.0, 1.0, 1.5, 3.0, 7.0, -1.0] {
            d.process(v);
        }
        assert_eq!(d.bins(), &[1, 2, 0, 1]);
        assert_eq!(d.count(), 6);
        assert!((d.mean() - 11.5 / 6.0).abs() < 1e-9);

        let mut buf = Vec::new();
        d.write_int(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("<0\t1\n0\t1\n"));
        assert!(text.contains(">=4\t1"));
    }

    #[test]
    fn summary_line_reports_spread() {
        let mut d = Distribution::new(0.0, 10.0, 1.0);
        d.process(2.0);
        d.process(4.0);
        assert!((d.variance() - 1.0).abs() < 1e-9);

        let mut buf = Vec::new();
        d.write_int(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with("Total\t2\tMean\t3.000\tSD\t1.000\n"));
    }

    #[test]
    fn mean_sd_basic() {
        let (m, sd) = mean_and_sd(&[100.0, 104.0]);
        assert_eq!(m, 102.0);
        assert!((sd - 2.0).abs() < 1e-9);
        assert_eq!(mean_and_sd(&[]), (0.0, 0.0));
    }
}
